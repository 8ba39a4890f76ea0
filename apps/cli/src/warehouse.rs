//! File-backed collaborators for offline dataset builds.
//!
//! The linking file is a JSON array of `ds_linking` rows:
//!
//! ```json
//! [{ "DOMAIN": "Condition", "DENORMALIZED_NAME": "PERSON_ID",
//!    "OMOP_SQL": "c_occurrence.PERSON_ID", "JOIN_VALUE": "FROM ... c_occurrence" }]
//! ```

use anyhow::Context;
use async_trait::async_trait;
use cohortql_sql::{CompiledQuery, ConceptCatalog, Error, ParamValue, Result, Row, WarehouseClient};
use std::path::Path;

/// Answers linking lookups from rows loaded out of a JSON file.
pub struct FileWarehouse {
    rows: Vec<Row>,
}

impl FileWarehouse {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read linking file {}", path.display()))?;
        let rows: Vec<Row> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse linking file {}", path.display()))?;
        tracing::debug!(rows = rows.len(), path = %path.display(), "Loaded linking rows");
        Ok(Self { rows })
    }

    #[cfg(test)]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl WarehouseClient for FileWarehouse {
    async fn execute_query(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        let domain = match query.parameter("pDomain") {
            Some(ParamValue::Scalar { value, .. }) => value,
            _ => {
                return Err(Error::Warehouse(
                    "file warehouse only answers ds_linking lookups".to_string(),
                ))
            }
        };
        let names = match query.parameter("pValuesList") {
            Some(ParamValue::Array { values, .. }) => values,
            _ => {
                return Err(Error::Warehouse(
                    "linking lookup is missing pValuesList".to_string(),
                ))
            }
        };

        let column = |row: &Row, name: &str| row.get(name).and_then(|v| v.as_str()).map(str::to_string);
        Ok(self
            .rows
            .iter()
            .filter(|row| column(row, "DOMAIN").as_deref() == Some(domain.as_str()))
            .filter(|row| {
                column(row, "DENORMALIZED_NAME").is_some_and(|n| names.contains(&n))
            })
            .cloned()
            .collect())
    }

    fn filter_config(&self, query: CompiledQuery) -> CompiledQuery {
        query
    }
}

/// Survey question concept ids from a JSON array, or none.
#[derive(Default)]
pub struct FileCatalog {
    survey_question_ids: Vec<i64>,
}

impl FileCatalog {
    pub fn from_path(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read survey concept file {}", path.display()))?;
        let survey_question_ids = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse survey concept file {}", path.display()))?;
        Ok(Self {
            survey_question_ids,
        })
    }
}

#[async_trait]
impl ConceptCatalog for FileCatalog {
    async fn survey_question_concept_ids(&self) -> Result<Vec<i64>> {
        Ok(self.survey_question_ids.clone())
    }
}
