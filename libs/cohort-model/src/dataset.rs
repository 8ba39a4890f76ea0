//! Dataset request model

use crate::domain::Domain;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cohorts, concept sets and export columns for one dataset build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRequest {
    #[serde(default)]
    pub cohorts: Vec<CohortReference>,

    #[serde(default)]
    pub concept_sets: Vec<ConceptSet>,

    #[serde(default)]
    pub pre_packaged_concept_set: PrePackagedConceptSet,

    /// Skip cohort membership filtering entirely
    #[serde(default)]
    pub includes_all_participants: bool,

    #[serde(default)]
    pub values: Vec<DomainValuePair>,
}

impl DatasetRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Requested domains in first-seen order.
    pub fn domains(&self) -> Vec<Domain> {
        let mut seen = BTreeSet::new();
        self.values
            .iter()
            .map(|v| v.domain)
            .filter(|d| seen.insert(*d))
            .collect()
    }
}

/// A cohort and its stored criteria document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortReference {
    pub id: i64,

    /// JSON-serialized [`crate::SearchRequest`]; `None` when nothing is stored
    #[serde(default)]
    pub criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub domain: Domain,

    #[serde(default)]
    pub concept_ids: BTreeSet<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrePackagedConceptSet {
    #[default]
    None,
    Demographics,
    Survey,
    Both,
}

impl PrePackagedConceptSet {
    pub fn includes_survey(&self) -> bool {
        matches!(self, PrePackagedConceptSet::Survey | PrePackagedConceptSet::Both)
    }
}

/// An export column (`value`) requested for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainValuePair {
    pub domain: Domain,
    pub value: String,
}

impl DomainValuePair {
    pub fn new(domain: Domain, value: impl Into<String>) -> Self {
        Self {
            domain,
            value: value.into(),
        }
    }
}
