//! Collaborators the dataset assembler calls out to.

use crate::error::Result;
use crate::fragment::TABLE_PREFIX;
use crate::params::CompiledQuery;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Executes parameterized queries against the data warehouse.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn execute_query(&self, query: &CompiledQuery) -> Result<Vec<Row>>;

    /// Bind deployment-specific settings (project, dataset) before execution.
    fn filter_config(&self, query: CompiledQuery) -> CompiledQuery;
}

/// Source of the concept ids behind pre-packaged concept sets.
#[async_trait]
pub trait ConceptCatalog: Send + Sync {
    async fn survey_question_concept_ids(&self) -> Result<Vec<i64>>;
}

/// Replace the `${projectId}.${dataSetId}` table prefix with concrete names.
///
/// Compiled queries never do this themselves; it belongs to whoever executes them.
pub fn substitute_placeholders(query: CompiledQuery, project: &str, dataset: &str) -> CompiledQuery {
    let (sql, parameters) = query.into_parts();
    let sql = sql.replace(TABLE_PREFIX, &format!("{}.{}", project, dataset));
    CompiledQuery::new(sql, parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_table_prefix_only() {
        let query = CompiledQuery::new(
            "select * from `${projectId}.${dataSetId}.person` where x = @p0",
            Default::default(),
        );
        let out = substitute_placeholders(query, "aou-prod", "r2019q4");
        assert_eq!(out.sql(), "select * from `aou-prod.r2019q4.person` where x = @p0");
    }
}
