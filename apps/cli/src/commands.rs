//! Subcommand implementations; each returns the JSON document to print.

use crate::config::Config;
use crate::warehouse::{FileCatalog, FileWarehouse};
use anyhow::Context;
use cohortql_model::{DatasetRequest, Domain, SearchRequest};
use cohortql_sql::{
    build_criteria_search_query, normalize, CompiledQuery, DatasetQueryBuilder, LinkingCache,
    ParticipantQueryBuilder, SchemaConfig,
};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

pub enum ParticipantQuery {
    Count,
    Ids { limit: Option<u64>, offset: u64 },
    Chart,
    DomainChart { domain: Domain, limit: Option<u64> },
}

pub fn normalize_term(config: &Config, term: &str) -> String {
    normalize(term, &config.search.stop_words())
}

pub fn participant(
    config: &Config,
    schema: &SchemaConfig,
    criteria: &Path,
    kind: ParticipantQuery,
) -> anyhow::Result<Value> {
    let request = read_search_request(criteria)?;
    let builder = ParticipantQueryBuilder::new(schema);

    let query = match kind {
        ParticipantQuery::Count => builder.count_query(&request),
        ParticipantQuery::Ids { limit, offset } => {
            builder.id_query(&request, limit.unwrap_or(config.query.id_limit), offset)
        }
        ParticipantQuery::Chart => builder.chart_query(&request),
        ParticipantQuery::DomainChart { domain, limit } => builder.domain_chart_query(
            &request,
            domain,
            limit.unwrap_or(config.query.chart_limit),
        ),
    }
    .context("Failed to compile criteria")?;

    to_json(&query)
}

pub fn search(
    config: &Config,
    domain: Domain,
    term: &str,
    source: bool,
    limit: Option<u64>,
) -> anyhow::Result<Value> {
    let query = build_criteria_search_query(
        domain,
        !source,
        term,
        limit.unwrap_or(config.query.chart_limit),
        &config.search.stop_words(),
    )
    .context("Failed to build criteria search")?;
    to_json(&query)
}

pub async fn dataset(
    config: &Config,
    schema: SchemaConfig,
    request: &Path,
    linking: &Path,
    survey_concepts: Option<&Path>,
) -> anyhow::Result<Value> {
    let raw = read(request)?;
    let request = DatasetRequest::from_json(&raw)
        .with_context(|| format!("Failed to parse dataset request {}", request.display()))?;

    let warehouse = Arc::new(FileWarehouse::from_path(linking)?);
    let catalog = Arc::new(FileCatalog::from_path(survey_concepts)?);
    let mut builder = DatasetQueryBuilder::new(schema, warehouse, catalog);
    if let Some(capacity) = NonZeroUsize::new(config.query.linking_cache_capacity) {
        builder = builder.with_linking_cache(Arc::new(LinkingCache::new(capacity)));
    }

    let queries = builder
        .build_per_domain_queries(&request)
        .await
        .context("Failed to build dataset queries")?;
    serde_json::to_value(&queries).context("Failed to serialize dataset queries")
}

fn read_search_request(path: &Path) -> anyhow::Result<SearchRequest> {
    let raw = read(path)?;
    SearchRequest::from_json(&raw)
        .with_context(|| format!("Failed to parse criteria document {}", path.display()))
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn to_json(query: &CompiledQuery) -> anyhow::Result<Value> {
    serde_json::to_value(query).context("Failed to serialize query")
}
