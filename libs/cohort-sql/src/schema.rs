//! Domain → table/column configuration.
//!
//! Passed into every compiler entry point as an immutable value; nothing here is
//! global. [`SchemaConfig::default`] is the standard OMOP layout and can be
//! overridden from configuration.

use crate::error::{Error, Result};
use cohortql_model::Domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTable {
    /// Occurrence table name, unqualified
    pub table: String,

    /// Base-table shorthand used by export joins (`c_occurrence.PERSON_ID`)
    pub alias: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_concept_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_concept_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_date_column: Option<String>,

    /// Column holding categorical answers
    #[serde(default = "default_value_concept_column")]
    pub value_concept_column: String,
}

fn default_value_concept_column() -> String {
    "value_as_concept_id".to_string()
}

impl DomainTable {
    fn occurrence(
        table: &str,
        alias: &str,
        standard: &str,
        source: &str,
        entry_date: &str,
    ) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            standard_concept_column: Some(standard.to_string()),
            source_concept_column: Some(source.to_string()),
            entry_date_column: Some(entry_date.to_string()),
            value_concept_column: default_value_concept_column(),
        }
    }

    fn bare(table: &str, alias: &str, entry_date: Option<&str>) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            standard_concept_column: None,
            source_concept_column: None,
            entry_date_column: entry_date.map(str::to_string),
            value_concept_column: default_value_concept_column(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub domains: BTreeMap<Domain, DomainTable>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let mut domains = BTreeMap::new();
        domains.insert(
            Domain::Condition,
            DomainTable::occurrence(
                "condition_occurrence",
                "c_occurrence",
                "condition_concept_id",
                "condition_source_concept_id",
                "condition_start_date",
            ),
        );
        domains.insert(
            Domain::Procedure,
            DomainTable::occurrence(
                "procedure_occurrence",
                "procedure",
                "procedure_concept_id",
                "procedure_source_concept_id",
                "procedure_date",
            ),
        );
        domains.insert(
            Domain::Drug,
            DomainTable::occurrence(
                "drug_exposure",
                "d_exposure",
                "drug_concept_id",
                "drug_source_concept_id",
                "drug_exposure_start_date",
            ),
        );
        domains.insert(
            Domain::Measurement,
            DomainTable::occurrence(
                "measurement",
                "measurement",
                "measurement_concept_id",
                "measurement_source_concept_id",
                "measurement_date",
            ),
        );
        domains.insert(
            Domain::Observation,
            DomainTable::occurrence(
                "observation",
                "observation",
                "observation_concept_id",
                "observation_source_concept_id",
                "observation_date",
            ),
        );
        domains.insert(
            Domain::Survey,
            DomainTable {
                value_concept_column: "value_source_concept_id".to_string(),
                ..DomainTable::occurrence(
                    "ds_survey",
                    "survey",
                    "question_concept_id",
                    "question_concept_id",
                    "survey_datetime",
                )
            },
        );
        domains.insert(
            Domain::Visit,
            DomainTable::occurrence(
                "visit_occurrence",
                "visit",
                "visit_concept_id",
                "visit_source_concept_id",
                "visit_start_date",
            ),
        );
        domains.insert(
            Domain::Person,
            DomainTable::bare("person", "person", None),
        );
        domains.insert(
            Domain::Death,
            DomainTable::bare("death", "death", Some("death_date")),
        );
        Self { domains }
    }
}

impl SchemaConfig {
    pub fn table(&self, domain: Domain) -> Result<&DomainTable> {
        self.domains.get(&domain).ok_or_else(|| {
            Error::internal(format!("No table configured for domain: {}", domain))
        })
    }

    pub fn alias(&self, domain: Domain) -> Result<&str> {
        Ok(self.table(domain)?.alias.as_str())
    }

    /// `(standard, source)` concept id columns.
    pub fn concept_columns(&self, domain: Domain) -> Result<(&str, &str)> {
        self.domains
            .get(&domain)
            .and_then(|t| {
                Some((
                    t.standard_concept_column.as_deref()?,
                    t.source_concept_column.as_deref()?,
                ))
            })
            .ok_or_else(|| {
                Error::internal(format!(
                    "Couldn't find source and standard columns for domain: {}",
                    domain
                ))
            })
    }

    /// Standard or source concept column, by choice.
    pub fn concept_column(&self, domain: Domain, source: bool) -> Result<&str> {
        let (standard, source_column) = self.concept_columns(domain)?;
        Ok(if source { source_column } else { standard })
    }

    pub fn entry_date_column(&self, domain: Domain) -> Result<&str> {
        self.table(domain)?
            .entry_date_column
            .as_deref()
            .ok_or_else(|| {
                Error::internal(format!(
                    "No entry date column configured for domain: {}",
                    domain
                ))
            })
    }
}
