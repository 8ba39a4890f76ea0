//! Cohort criteria models
//!
//! Strongly-typed structures for the documents the cohort compiler consumes:
//!
//! - [`SearchRequest`]: a nested include/exclude criteria tree describing a cohort
//! - [`DatasetRequest`]: cohorts plus concept sets and export columns for a dataset
//!
//! Item kinds are a closed tagged union ([`ItemCriteria`]), so an unknown `type`
//! string fails at deserialization instead of deep inside the compiler.
//!
//! # Example
//!
//! ```rust
//! use cohortql_model::{ItemCriteria, SearchRequest};
//!
//! let request = SearchRequest::from_json(r#"{
//!     "includes": [{
//!         "items": [{
//!             "type": "ICD9",
//!             "searchParameters": [{ "domain": "Condition", "value": "001.1" }]
//!         }]
//!     }]
//! }"#).unwrap();
//!
//! assert!(matches!(request.includes[0].items[0].criteria, ItemCriteria::Icd9(_)));
//! ```

mod criteria;
mod dataset;
mod domain;
mod error;

pub use criteria::*;
pub use dataset::*;
pub use domain::Domain;
pub use error::{Error, Result};
