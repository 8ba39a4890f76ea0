//! Named query parameters.
//!
//! Parameters are written `@name` in SQL text and bound to typed values when the
//! warehouse executes the query. [`ParameterNamespace`] hands out names that are
//! unique within one compile pass; [`rekey`] renames every parameter of an already
//! compiled query so several of them can be unioned together.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Warehouse type tag carried by every parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamType {
    String,
    Int64,
    Float64,
    Date,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ParamValue {
    Scalar {
        #[serde(rename = "type")]
        param_type: ParamType,
        value: String,
    },
    Array {
        #[serde(rename = "type")]
        param_type: ParamType,
        values: Vec<String>,
    },
}

impl ParamValue {
    pub fn scalar(param_type: ParamType, value: impl Into<String>) -> Self {
        ParamValue::Scalar {
            param_type,
            value: value.into(),
        }
    }

    pub fn array<I, S>(param_type: ParamType, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamValue::Array {
            param_type,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::scalar(ParamType::String, value)
    }

    pub fn int64(value: i64) -> Self {
        Self::scalar(ParamType::Int64, value.to_string())
    }

    pub fn int64_array<I: IntoIterator<Item = i64>>(values: I) -> Self {
        Self::array(ParamType::Int64, values.into_iter().map(|v| v.to_string()))
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Scalar { param_type, .. } | ParamValue::Array { param_type, .. } => {
                *param_type
            }
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ParamValue::Array { .. })
    }
}

/// SQL text plus the named parameters it references. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    sql: String,
    parameters: BTreeMap<String, ParamValue>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, parameters: BTreeMap<String, ParamValue>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParamValue> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn into_parts(self) -> (String, BTreeMap<String, ParamValue>) {
        (self.sql, self.parameters)
    }
}

/// Issues parameter names for one compile pass.
///
/// Each base name gets its own counter starting at 0, so the first `Condition`
/// parameter is `Condition0` and the next is `Condition1`. Names already issued
/// under a different base are skipped, which keeps `p1` + `0` from colliding
/// with `p` + `10`.
#[derive(Debug, Default)]
pub struct ParameterNamespace {
    counters: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl ParameterNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, base: &str) -> String {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            let name = format!("{}{}", base, counter);
            *counter += 1;
            if self.issued.insert(name.clone()) {
                tracing::trace!(param = %name, "Allocated query parameter");
                return name;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// Rename every parameter of `compiled` to `<name>_<suffix>`.
///
/// All names are replaced in one pass over a single boundary-anchored
/// alternation, longest first, so `@p1` never rewrites part of `@p10` and the
/// outcome does not depend on map ordering.
pub fn rekey(compiled: &CompiledQuery, suffix: &str) -> Result<CompiledQuery> {
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidCriteria(format!(
            "parameter suffix '{}' is not an identifier",
            suffix
        )));
    }
    if compiled.parameters.is_empty() {
        return Ok(compiled.clone());
    }

    let mut names: Vec<&str> = compiled.parameters.keys().map(String::as_str).collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(r"@({})\b", alternation))
        .map_err(|e| Error::internal(format!("failed to build rekey pattern: {}", e)))?;

    let sql = pattern
        .replace_all(&compiled.sql, |caps: &regex::Captures<'_>| {
            format!("@{}_{}", &caps[1], suffix)
        })
        .into_owned();

    let parameters = compiled
        .parameters
        .iter()
        .map(|(name, value)| (format!("{}_{}", name, suffix), value.clone()))
        .collect();

    Ok(CompiledQuery { sql, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_counts_per_base() {
        let mut ns = ParameterNamespace::new();
        assert_eq!(ns.fresh("Condition"), "Condition0");
        assert_eq!(ns.fresh("Condition"), "Condition1");
        assert_eq!(ns.fresh("gen"), "gen0");
        assert_eq!(ns.len(), 3);
    }

    #[test]
    fn fresh_never_repeats_across_bases() {
        let mut ns = ParameterNamespace::new();
        let first = ns.fresh("p1");
        for _ in 0..10 {
            ns.fresh("p");
        }
        let clash = ns.fresh("p");
        assert_eq!(first, "p10");
        assert_ne!(clash, "p10");
        assert_eq!(clash, "p11");
    }

    #[test]
    fn rekey_matches_whole_names_only() {
        let mut params = BTreeMap::new();
        params.insert("p1".to_string(), ParamValue::string("a"));
        params.insert("p10".to_string(), ParamValue::string("b"));
        let query = CompiledQuery::new("select @p1, @p10 where x = @p1", params);

        let rekeyed = rekey(&query, "suffix").unwrap();

        assert_eq!(
            rekeyed.sql(),
            "select @p1_suffix, @p10_suffix where x = @p1_suffix"
        );
        assert_eq!(
            rekeyed.parameter("p1_suffix"),
            Some(&ParamValue::string("a"))
        );
        assert_eq!(
            rekeyed.parameter("p10_suffix"),
            Some(&ParamValue::string("b"))
        );
        assert_eq!(rekeyed.parameters().len(), 2);
    }

    #[test]
    fn rekey_leaves_columns_alone() {
        let mut params = BTreeMap::new();
        params.insert("gen0".to_string(), ParamValue::int64(8507));
        let query = CompiledQuery::new("where gen0 = @gen0", params);

        let rekeyed = rekey(&query, "3").unwrap();
        assert_eq!(rekeyed.sql(), "where gen0 = @gen0_3");
    }

    #[test]
    fn rekey_without_parameters_is_identity() {
        let query = CompiledQuery::new("select 1", BTreeMap::new());
        assert_eq!(rekey(&query, "1").unwrap(), query);
    }

    #[test]
    fn rekey_rejects_suffix_outside_identifier_chars() {
        let mut params = BTreeMap::new();
        params.insert("gen0".to_string(), ParamValue::int64(8507));
        let query = CompiledQuery::new("where p.gender_concept_id = @gen0", params);

        let err = rekey(&query, "-3").unwrap_err();
        assert!(matches!(err, Error::InvalidCriteria(_)));
        assert!(rekey(&query, "").is_err());
    }
}
