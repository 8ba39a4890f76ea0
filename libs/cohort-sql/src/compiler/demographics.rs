//! Demographic items: direct predicates on the person table.

use super::operators::push_comparison;
use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::{ParamType, ParamValue};
use crate::schema::SchemaConfig;
use cohortql_model::{Attribute, DemographicCriteria, DemographicParameter, Domain};

const AGE_IN_YEARS: &str = "CAST(FLOOR(DATE_DIFF(CURRENT_DATE, DATE(p.year_of_birth, p.month_of_birth, p.day_of_birth), MONTH)/12) as INT64)";

enum Predicate<'a> {
    Concept {
        column: &'static str,
        base: &'static str,
        ids: Vec<i64>,
    },
    Age(&'a Attribute),
    Deceased,
}

pub(super) fn item_sql(criteria: &DemographicCriteria, schema: &SchemaConfig) -> Result<Sql> {
    if criteria.search_parameters.is_empty() {
        return Err(Error::InvalidCriteria(
            "DEMO search item has no search parameters".to_string(),
        ));
    }

    let mut predicates: Vec<Predicate<'_>> = Vec::new();
    for param in &criteria.search_parameters {
        let (column, base, concept_id) = match param {
            DemographicParameter::Gen { concept_id } => ("gender_concept_id", "gen", *concept_id),
            DemographicParameter::Race { concept_id } => ("race_concept_id", "race", *concept_id),
            DemographicParameter::Eth { concept_id } => {
                ("ethnicity_concept_id", "eth", *concept_id)
            }
            DemographicParameter::Age { attribute } => {
                predicates.push(Predicate::Age(attribute));
                continue;
            }
            DemographicParameter::Dec => {
                predicates.push(Predicate::Deceased);
                continue;
            }
        };
        // Repeated subtypes widen one predicate rather than AND-ing to nothing.
        let existing = predicates.iter_mut().find_map(|p| match p {
            Predicate::Concept { column: c, ids, .. } if *c == column => Some(ids),
            _ => None,
        });
        match existing {
            Some(ids) => ids.push(concept_id),
            None => predicates.push(Predicate::Concept {
                column,
                base,
                ids: vec![concept_id],
            }),
        }
    }

    let death = table(&schema.table(Domain::Death)?.table);
    let rendered = predicates
        .into_iter()
        .map(|p| predicate_sql(p, &death))
        .collect::<Result<Vec<_>>>()?;

    let mut sql = Sql::text(format!(
        "select distinct person_id\nfrom {} p\nwhere ",
        table(&schema.table(Domain::Person)?.table)
    ));
    sql.append(Sql::join(rendered, "and "));
    Ok(sql)
}

fn predicate_sql(predicate: Predicate<'_>, death: &str) -> Result<Sql> {
    let deceased = format!(
        "exists (\nSELECT 'x' FROM {} d\nwhere d.person_id = p.person_id)\n",
        death
    );
    match predicate {
        Predicate::Concept { column, base, ids } => {
            let mut sql = Sql::text(format!("p.{} ", column));
            if let [id] = ids.as_slice() {
                sql.push_str("= ").push_param(base, ParamValue::int64(*id));
            } else {
                sql.push_str("in unnest(")
                    .push_param(base, ParamValue::int64_array(ids))
                    .push_str(")");
            }
            sql.push_str("\n");
            Ok(sql)
        }
        Predicate::Age(attribute) => {
            let mut sql = Sql::text(format!("{} ", AGE_IN_YEARS));
            push_comparison(
                &mut sql,
                "AGE demographic",
                "age",
                attribute.operator,
                &attribute.operands,
                ParamType::Int64,
            )?;
            sql.push_str("\nand not ").push_str(&deceased);
            Ok(sql)
        }
        Predicate::Deceased => Ok(Sql::text(deceased)),
    }
}
