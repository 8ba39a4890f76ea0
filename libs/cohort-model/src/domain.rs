//! OMOP data domains

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A clinical category with its own occurrence table.
///
/// Serialized upper-case (`CONDITION`); the title-cased spelling used by
/// criteria documents (`Condition`) is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    #[serde(alias = "Condition")]
    Condition,
    #[serde(alias = "Procedure")]
    Procedure,
    #[serde(alias = "Drug")]
    Drug,
    #[serde(alias = "Measurement")]
    Measurement,
    #[serde(alias = "Observation")]
    Observation,
    #[serde(alias = "Person")]
    Person,
    #[serde(alias = "Survey")]
    Survey,
    #[serde(alias = "Visit")]
    Visit,
    #[serde(alias = "Death")]
    Death,
}

impl Domain {
    pub const ALL: [Domain; 9] = [
        Domain::Condition,
        Domain::Procedure,
        Domain::Drug,
        Domain::Measurement,
        Domain::Observation,
        Domain::Person,
        Domain::Survey,
        Domain::Visit,
        Domain::Death,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Condition => "CONDITION",
            Domain::Procedure => "PROCEDURE",
            Domain::Drug => "DRUG",
            Domain::Measurement => "MEASUREMENT",
            Domain::Observation => "OBSERVATION",
            Domain::Person => "PERSON",
            Domain::Survey => "SURVEY",
            Domain::Visit => "VISIT",
            Domain::Death => "DEATH",
        }
    }

    /// Title-cased name (`Condition`), used for parameter base names.
    pub fn title(&self) -> &'static str {
        match self {
            Domain::Condition => "Condition",
            Domain::Procedure => "Procedure",
            Domain::Drug => "Drug",
            Domain::Measurement => "Measurement",
            Domain::Observation => "Observation",
            Domain::Person => "Person",
            Domain::Survey => "Survey",
            Domain::Visit => "Visit",
            Domain::Death => "Death",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidFieldValue(format!("unknown domain '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("condition".parse::<Domain>().unwrap(), Domain::Condition);
        assert_eq!("Survey".parse::<Domain>().unwrap(), Domain::Survey);
        assert!("labs".parse::<Domain>().is_err());
    }

    #[test]
    fn deserializes_both_spellings() {
        let upper: Domain = serde_json::from_str("\"PROCEDURE\"").unwrap();
        let title: Domain = serde_json::from_str("\"Procedure\"").unwrap();
        assert_eq!(upper, title);
        assert_eq!(serde_json::to_string(&upper).unwrap(), "\"PROCEDURE\"");
    }
}
