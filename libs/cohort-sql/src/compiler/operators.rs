use crate::error::{Error, Result};
use crate::fragment::Sql;
use crate::params::{ParamType, ParamValue};
use chrono::NaiveDate;
use cohortql_model::Operator;
use rust_decimal::Decimal;
use std::str::FromStr;

pub(crate) fn sql_operator(op: Operator) -> &'static str {
    match op {
        Operator::Equal => "=",
        Operator::NotEqual => "!=",
        Operator::LessThan => "<",
        Operator::GreaterThan => ">",
        Operator::LessThanOrEqualTo => "<=",
        Operator::GreaterThanOrEqualTo => ">=",
        Operator::Between => "between",
        Operator::In => "in",
        Operator::NotIn => "not in",
        Operator::Like => "like",
    }
}

/// Append `<op> @p`, `between @a and @b` or `in unnest(@list)` after checking
/// operand count and converting every operand to `param_type`.
pub(crate) fn push_comparison(
    sql: &mut Sql,
    context: &str,
    base: &str,
    op: Operator,
    operands: &[String],
    param_type: ParamType,
) -> Result<()> {
    let values = typed_operands(context, op, operands, param_type)?;
    match op {
        Operator::Between => {
            sql.push_str("between ")
                .push_param(base, ParamValue::scalar(param_type, values[0].clone()))
                .push_str(" and ")
                .push_param(base, ParamValue::scalar(param_type, values[1].clone()));
        }
        Operator::In | Operator::NotIn => {
            sql.push_str(sql_operator(op))
                .push_str(" unnest(")
                .push_param(base, ParamValue::array(param_type, values))
                .push_str(")");
        }
        _ => {
            sql.push_str(sql_operator(op))
                .push_str(" ")
                .push_param(base, ParamValue::scalar(param_type, values[0].clone()));
        }
    }
    Ok(())
}

pub(crate) fn typed_operands(
    context: &str,
    op: Operator,
    operands: &[String],
    param_type: ParamType,
) -> Result<Vec<String>> {
    match op.arity() {
        Some(n) if operands.len() != n => {
            return Err(Error::InvalidCriteria(format!(
                "{}: operator {:?} takes {} operand(s), got {}",
                context,
                op,
                n,
                operands.len()
            )));
        }
        None if operands.is_empty() => {
            return Err(Error::InvalidCriteria(format!(
                "{}: operator {:?} needs at least one operand",
                context, op
            )));
        }
        _ => {}
    }
    operands
        .iter()
        .map(|raw| canonical_operand(context, raw, param_type))
        .collect()
}

fn canonical_operand(context: &str, raw: &str, param_type: ParamType) -> Result<String> {
    let raw = raw.trim();
    let invalid = |kind: &str| {
        Error::InvalidCriteria(format!("{}: '{}' is not a valid {}", context, raw, kind))
    };
    match param_type {
        ParamType::Int64 => raw
            .parse::<i64>()
            .map(|v| v.to_string())
            .map_err(|_| invalid("integer")),
        ParamType::Float64 => Decimal::from_str(raw)
            .map(|d| d.normalize().to_string())
            .map_err(|_| invalid("number")),
        ParamType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .map_err(|_| invalid("date (YYYY-MM-DD)")),
        ParamType::Bool => raw
            .parse::<bool>()
            .map(|b| b.to_string())
            .map_err(|_| invalid("boolean")),
        ParamType::String => Ok(raw.to_string()),
    }
}
