//! Resolution of requested value columns through the `ds_linking` table.
//!
//! Each linking row maps a denormalized column name to the SQL that selects it
//! (`OMOP_SQL`) and the join that makes it reachable (`JOIN_VALUE`). The
//! [`CORE_TABLE_FOR_DOMAIN`] row carries the domain's base `FROM` clause.

use crate::error::{Error, Result};
use crate::fragment::table;
use crate::params::{CompiledQuery, ParamType, ParamValue};
use crate::warehouse::{Row, WarehouseClient};
use cohortql_model::Domain;
use lru::LruCache;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

pub const CORE_TABLE_FOR_DOMAIN: &str = "CORE_TABLE_FOR_DOMAIN";

/// Select expressions and join clauses for one domain's requested values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuesLinkingPair {
    pub selects: Vec<String>,
    pub joins: Vec<String>,
}

/// "QWERTY" -> "Qwerty", the casing the linking table stores domains in.
pub fn capitalize_first_character_only(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Lookup query for `values` of `domain`; the sentinel is always requested first.
pub fn linking_query(domain: Domain, values: &[String]) -> CompiledQuery {
    let mut names = Vec::with_capacity(values.len() + 1);
    names.push(CORE_TABLE_FOR_DOMAIN.to_string());
    names.extend(values.iter().map(|v| v.to_uppercase()));

    let mut parameters = BTreeMap::new();
    parameters.insert(
        "pDomain".to_string(),
        ParamValue::string(capitalize_first_character_only(domain.as_str())),
    );
    parameters.insert(
        "pValuesList".to_string(),
        ParamValue::array(ParamType::String, names),
    );

    CompiledQuery::new(
        format!(
            "SELECT * FROM {} WHERE DOMAIN = @pDomain AND DENORMALIZED_NAME in unnest(@pValuesList)",
            table("ds_linking")
        ),
        parameters,
    )
}

/// Fold linking rows into selects (sentinel excluded) and deduplicated joins.
pub fn values_linking_pair(rows: &[Row]) -> Result<ValuesLinkingPair> {
    let mut pair = ValuesLinkingPair::default();
    for row in rows {
        let join = string_column(row, "JOIN_VALUE")?;
        let omop_sql = string_column(row, "OMOP_SQL")?;
        if !pair.joins.iter().any(|j| j == join) {
            pair.joins.push(join.to_string());
        }
        if omop_sql != CORE_TABLE_FOR_DOMAIN {
            pair.selects.push(omop_sql.to_string());
        }
    }
    Ok(pair)
}

fn string_column<'r>(row: &'r Row, column: &str) -> Result<&'r str> {
    row.get(column)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::internal(format!("linking row has no string column {}", column)))
}

/// Run the linking lookup for one domain.
pub async fn resolve(
    warehouse: &dyn WarehouseClient,
    domain: Domain,
    values: &[String],
) -> Result<ValuesLinkingPair> {
    let query = warehouse.filter_config(linking_query(domain, values));
    let rows = warehouse.execute_query(&query).await?;
    tracing::debug!(domain = %domain, rows = rows.len(), "Resolved linking rows");
    values_linking_pair(&rows)
}

type CacheKey = (Domain, Vec<String>);

/// Bounded cache of resolved linking pairs, keyed by domain and value set.
pub struct LinkingCache {
    entries: Mutex<LruCache<CacheKey, ValuesLinkingPair>>,
}

impl LinkingCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(domain: Domain, values: &[String]) -> CacheKey {
        let mut values: Vec<String> = values.iter().map(|v| v.to_uppercase()).collect();
        values.sort();
        values.dedup();
        (domain, values)
    }

    pub fn get(&self, domain: Domain, values: &[String]) -> Option<ValuesLinkingPair> {
        let key = Self::key(domain, values);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = entries.get(&key).cloned();
        tracing::debug!(domain = %domain, hit = hit.is_some(), "Linking cache lookup");
        hit
    }

    pub fn put(&self, domain: Domain, values: &[String], pair: ValuesLinkingPair) {
        let key = Self::key(domain, values);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(key, pair);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`resolve`], consulting `cache` first when one is configured.
pub async fn resolve_cached(
    warehouse: &dyn WarehouseClient,
    cache: Option<&LinkingCache>,
    domain: Domain,
    values: &[String],
) -> Result<ValuesLinkingPair> {
    if let Some(pair) = cache.and_then(|c| c.get(domain, values)) {
        return Ok(pair);
    }
    let pair = resolve(warehouse, domain, values).await?;
    if let Some(cache) = cache {
        cache.put(domain, values, pair.clone());
    }
    Ok(pair)
}
