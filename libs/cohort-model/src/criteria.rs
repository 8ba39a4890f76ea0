//! Criteria tree model
//!
//! A [`SearchRequest`] is a list of include groups and a list of exclude groups.
//! Items inside a group are OR-combined; groups are AND-combined; every exclude
//! group removes the participants it matches.

use crate::domain::Domain;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Root of a cohort definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub includes: Vec<SearchGroup>,

    #[serde(default)]
    pub excludes: Vec<SearchGroup>,
}

impl SearchRequest {
    /// Parse a stored criteria document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroup {
    #[serde(default)]
    pub items: Vec<SearchGroupItem>,

    /// Items are paired across temporal groups 0 and 1 instead of OR-combined
    #[serde(default)]
    pub temporal: bool,

    #[serde(default)]
    pub mention: TemporalMention,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TemporalTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroupItem {
    #[serde(flatten)]
    pub criteria: ItemCriteria,

    /// Co-occurrence key inside a temporal group (0 or 1)
    #[serde(default)]
    pub temporal_group: i32,

    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

/// What a search item matches, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ItemCriteria {
    #[serde(rename = "ICD9")]
    Icd9(CodeCriteria),
    #[serde(rename = "ICD10")]
    Icd10(CodeCriteria),
    #[serde(rename = "CPT")]
    Cpt(CodeCriteria),
    #[serde(rename = "CONCEPT")]
    Concept(ConceptCriteria),
    #[serde(rename = "DEMO")]
    Demographic(DemographicCriteria),
}

impl ItemCriteria {
    /// Source vocabulary family for code items.
    pub fn vocabulary(&self) -> Option<CodeVocabulary> {
        match self {
            ItemCriteria::Icd9(_) => Some(CodeVocabulary::Icd9),
            ItemCriteria::Icd10(_) => Some(CodeVocabulary::Icd10),
            ItemCriteria::Cpt(_) => Some(CodeVocabulary::Cpt),
            ItemCriteria::Concept(_) | ItemCriteria::Demographic(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ItemCriteria::Icd9(_) => "ICD9",
            ItemCriteria::Icd10(_) => "ICD10",
            ItemCriteria::Cpt(_) => "CPT",
            ItemCriteria::Concept(_) => "CONCEPT",
            ItemCriteria::Demographic(_) => "DEMO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeVocabulary {
    Icd9,
    Icd10,
    Cpt,
}

impl CodeVocabulary {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeVocabulary::Icd9 => "ICD9",
            CodeVocabulary::Icd10 => "ICD10",
            CodeVocabulary::Cpt => "CPT",
        }
    }
}

/// Source codes (ICD9, ICD10, CPT) matched through the concept table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCriteria {
    #[serde(default)]
    pub search_parameters: Vec<CodeParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeParameter {
    pub domain: Domain,

    /// The source code, e.g. `001.1`
    pub value: String,

    /// A parent code; matches every code under it
    #[serde(default, alias = "group")]
    pub is_group_concept: bool,
}

/// Concept ids matched directly against a domain's concept columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptCriteria {
    #[serde(default)]
    pub search_parameters: Vec<ConceptParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptParameter {
    pub domain: Domain,

    pub concept_id: i64,

    /// Hierarchy node: matches all descendants via `concept_ancestor`
    #[serde(default, alias = "group")]
    pub is_group_concept: bool,

    /// Match the source concept column rather than the standard one
    #[serde(default)]
    pub uses_source_concept: bool,

    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicCriteria {
    #[serde(default)]
    pub search_parameters: Vec<DemographicParameter>,
}

/// Person-table predicates, tagged by `subtype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subtype", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemographicParameter {
    #[serde(rename_all = "camelCase")]
    Gen { concept_id: i64 },
    #[serde(rename_all = "camelCase")]
    Race { concept_id: i64 },
    #[serde(rename_all = "camelCase")]
    Eth { concept_id: i64 },
    Age { attribute: Attribute },
    Dec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: AttributeName,

    pub operator: Operator,

    #[serde(default)]
    pub operands: Vec<String>,

    /// Targets a different concept than the owning parameter (systolic/diastolic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeName {
    /// Numeric value (`value_as_number`)
    Num,
    /// Categorical value (`value_as_concept_id`)
    Cat,
    /// Any recorded value
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    #[serde(alias = "LESS_THAN_OR_EQUAL")]
    LessThanOrEqualTo,
    #[serde(alias = "GREATER_THAN_OR_EQUAL")]
    GreaterThanOrEqualTo,
    Between,
    In,
    NotIn,
    Like,
}

impl Operator {
    /// Number of operands the operator takes, `None` for list operators.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Operator::Between => Some(2),
            Operator::In | Operator::NotIn => None,
            _ => Some(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifier {
    #[serde(alias = "kind")]
    pub name: ModifierKind,

    pub operator: Operator,

    #[serde(default)]
    pub operands: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModifierKind {
    AgeAtEvent,
    NumOfOccurrences,
    #[serde(alias = "DATE_RANGE")]
    EventDate,
    #[serde(alias = "ENCOUNTER")]
    Encounters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalMention {
    #[default]
    AnyMention,
    FirstMention,
    LastMention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalTime {
    DuringSameEncounterAs,
    XDaysBefore,
    XDaysAfter,
    WithinXDaysOf,
}
