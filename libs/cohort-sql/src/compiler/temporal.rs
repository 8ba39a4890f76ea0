//! Temporal groups: pair events of two item sets per participant.

use super::{CriteriaCompiler, Output};
use crate::error::{Error, Result};
use crate::fragment::Sql;
use crate::params::ParamValue;
use cohortql_model::{SearchGroup, TemporalMention, TemporalTime};

pub(super) fn group_sql(compiler: &CriteriaCompiler<'_>, group: &SearchGroup) -> Result<Sql> {
    let time = group.time.ok_or_else(|| {
        Error::InvalidCriteria("temporal search group requires a time relation".to_string())
    })?;
    let time_value = match time {
        TemporalTime::DuringSameEncounterAs => None,
        _ => match group.time_value {
            Some(v) if v >= 0 => Some(v),
            Some(v) => {
                return Err(Error::InvalidCriteria(format!(
                    "temporal time value must not be negative, got {}",
                    v
                )))
            }
            None => {
                return Err(Error::InvalidCriteria(format!(
                    "temporal relation {:?} requires a time value",
                    time
                )))
            }
        },
    };

    let mut sides: [Vec<Sql>; 2] = [Vec::new(), Vec::new()];
    for item in &group.items {
        let side = match item.temporal_group {
            0 => &mut sides[0],
            1 => &mut sides[1],
            other => {
                return Err(Error::InvalidCriteria(format!(
                    "temporal group index must be 0 or 1, got {}",
                    other
                )))
            }
        };
        side.push(compiler.item_sql(item, Output::Events)?);
    }
    let [first, second] = sides;
    if first.is_empty() || second.is_empty() {
        return Err(Error::InvalidCriteria(
            "temporal search group needs items on both sides".to_string(),
        ));
    }

    let first = mention(Sql::join(first, "union all\n"), group.mention);
    let second = Sql::join(second, "union all\n");

    let mut sql = first.wrap("select temp1.person_id\nfrom (", ") temp1\n");
    sql.push_str("where exists (select 1\nfrom (");
    sql.append(second);
    sql.push_str(") temp2\nwhere (temp1.person_id = temp2.person_id and ");
    push_condition(&mut sql, time, time_value);
    sql.push_str("))\n");

    tracing::debug!(mention = ?group.mention, time = ?time, "Compiled temporal group");
    Ok(sql)
}

/// Keep only the first or last event per participant.
fn mention(events: Sql, mention: TemporalMention) -> Sql {
    let order = match mention {
        TemporalMention::AnyMention => return events,
        TemporalMention::FirstMention => "",
        TemporalMention::LastMention => " desc",
    };
    let mut sql = events.wrap(
        &format!(
            "select person_id, visit_occurrence_id, entry_date\n\
             from (select person_id, visit_occurrence_id, entry_date, rank() over (partition by person_id order by entry_date{}) rn\n\
             from (",
            order
        ),
        ") events)\n",
    );
    sql.push_str("where rn = 1\n");
    sql
}

fn push_condition(sql: &mut Sql, time: TemporalTime, time_value: Option<i64>) {
    let Some(days) = time_value else {
        sql.push_str("temp1.visit_occurrence_id = temp2.visit_occurrence_id");
        return;
    };
    let slot = sql.bind("timeValue", ParamValue::int64(days));
    match time {
        TemporalTime::XDaysBefore => {
            sql.push_str("temp1.entry_date <= DATE_SUB(temp2.entry_date, INTERVAL ")
                .push_slot(slot)
                .push_str(" DAY)");
        }
        TemporalTime::XDaysAfter => {
            sql.push_str("temp1.entry_date >= DATE_ADD(temp2.entry_date, INTERVAL ")
                .push_slot(slot)
                .push_str(" DAY)");
        }
        TemporalTime::WithinXDaysOf => {
            sql.push_str("temp1.entry_date between DATE_SUB(temp2.entry_date, INTERVAL ")
                .push_slot(slot)
                .push_str(" DAY) and DATE_ADD(temp2.entry_date, INTERVAL ")
                .push_slot(slot)
                .push_str(" DAY)");
        }
        TemporalTime::DuringSameEncounterAs => {
            sql.push_str("temp1.visit_occurrence_id = temp2.visit_occurrence_id");
        }
    }
}
