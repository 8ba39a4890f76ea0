//! Item modifiers: event-level filters and the occurrence-count aggregate.

use super::operators::{push_comparison, typed_operands};
use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::ParamType;
use crate::schema::SchemaConfig;
use cohortql_model::{Domain, Modifier, ModifierKind};

#[derive(Debug, Default)]
pub(super) struct ItemModifiers<'a> {
    age_at_event: Option<&'a Modifier>,
    event_date: Option<&'a Modifier>,
    encounters: Option<&'a Modifier>,
    occurrences: Option<&'a Modifier>,
}

impl<'a> ItemModifiers<'a> {
    /// Sort modifiers by kind, rejecting duplicates and malformed operands up front.
    pub(super) fn from_item(modifiers: &'a [Modifier]) -> Result<Self> {
        let mut out = ItemModifiers::default();
        for modifier in modifiers {
            let slot = match modifier.name {
                ModifierKind::AgeAtEvent => &mut out.age_at_event,
                ModifierKind::EventDate => &mut out.event_date,
                ModifierKind::Encounters => &mut out.encounters,
                ModifierKind::NumOfOccurrences => &mut out.occurrences,
            };
            if slot.is_some() {
                return Err(Error::InvalidCriteria(format!(
                    "modifier {:?} given more than once",
                    modifier.name
                )));
            }
            typed_operands(
                &context(modifier.name),
                modifier.operator,
                &modifier.operands,
                param_type(modifier.name),
            )?;
            *slot = Some(modifier);
        }
        Ok(out)
    }

    pub(super) fn is_empty(&self) -> bool {
        self.age_at_event.is_none()
            && self.event_date.is_none()
            && self.encounters.is_none()
            && self.occurrences.is_none()
    }

    pub(super) fn counts_occurrences(&self) -> bool {
        self.occurrences.is_some()
    }

    /// Append one `and ...` line per event-level modifier.
    pub(super) fn push_filters(
        &self,
        sql: &mut Sql,
        schema: &SchemaConfig,
        domain: Domain,
    ) -> Result<()> {
        if let Some(m) = self.age_at_event {
            let date = schema.entry_date_column(domain)?;
            let person = table(&schema.table(Domain::Person)?.table);
            sql.push_str(&format!(
                "and DATE_DIFF(DATE(a.{}), (select DATE(pe.birth_datetime) from {} pe where pe.person_id = a.person_id), YEAR) ",
                date, person
            ));
            push(sql, m)?;
            sql.push_str("\n");
        }
        if let Some(m) = self.event_date {
            let date = schema.entry_date_column(domain)?;
            sql.push_str(&format!("and DATE(a.{}) ", date));
            push(sql, m)?;
            sql.push_str("\n");
        }
        if let Some(m) = self.encounters {
            let visit = table(&schema.table(Domain::Visit)?.table);
            sql.push_str(&format!(
                "and a.visit_occurrence_id in (select visit_occurrence_id\nfrom {}\nwhere visit_concept_id ",
                visit
            ));
            push(sql, m)?;
            sql.push_str(")\n");
        }
        Ok(())
    }

    /// Keep participants whose per-concept event count satisfies the modifier.
    /// `query` must select `person_id` and `concept_id`.
    pub(super) fn wrap_occurrences(&self, query: Sql) -> Result<Sql> {
        let Some(m) = self.occurrences else {
            return Ok(query);
        };
        let mut sql = query.wrap("select criteria.person_id from (", ") criteria\n");
        sql.push_str(
            "group by criteria.person_id, criteria.concept_id\nhaving count(criteria.person_id) ",
        );
        push(&mut sql, m)?;
        sql.push_str("\n");
        Ok(sql)
    }
}

fn push(sql: &mut Sql, modifier: &Modifier) -> Result<()> {
    push_comparison(
        sql,
        &context(modifier.name),
        base_name(modifier.name),
        modifier.operator,
        &modifier.operands,
        param_type(modifier.name),
    )
}

fn base_name(kind: ModifierKind) -> &'static str {
    match kind {
        ModifierKind::AgeAtEvent => "ageAtEvent",
        ModifierKind::EventDate => "eventDate",
        ModifierKind::Encounters => "encounter",
        ModifierKind::NumOfOccurrences => "occurrences",
    }
}

fn param_type(kind: ModifierKind) -> ParamType {
    match kind {
        ModifierKind::EventDate => ParamType::Date,
        _ => ParamType::Int64,
    }
}

fn context(kind: ModifierKind) -> String {
    format!("{:?} modifier", kind)
}
