//! Cohort SQL compiler
//!
//! Turns cohort criteria trees and dataset requests into parameterized warehouse
//! SQL. Nothing here talks to a database except through the [`WarehouseClient`]
//! and [`ConceptCatalog`] collaborators the dataset builder is handed.
//!
//! # Pipeline
//!
//! ```text
//! SearchRequest (JSON)
//!      |
//!   CriteriaCompiler -> Sql fragment (unnamed parameter slots)
//!      |
//!   ParticipantQueryBuilder -> count / ids / chart query
//!      |
//!   Sql::render -> CompiledQuery { sql, parameters }
//! ```
//!
//! Table names are emitted as `` `${projectId}.${dataSetId}.<table>` `` and left
//! for the executor to substitute.
//!
//! # Example
//!
//! ```rust
//! use cohortql_model::SearchRequest;
//! use cohortql_sql::{ParticipantQueryBuilder, SchemaConfig};
//!
//! let request = SearchRequest::from_json(r#"{
//!     "includes": [{ "items": [{
//!         "type": "DEMO",
//!         "searchParameters": [{ "subtype": "GEN", "conceptId": 8507 }]
//!     }]}]
//! }"#).unwrap();
//!
//! let schema = SchemaConfig::default();
//! let query = ParticipantQueryBuilder::new(&schema).count_query(&request).unwrap();
//! assert!(query.sql().contains("p.gender_concept_id = @gen0"));
//! ```

pub mod compiler;
pub mod criteria_search;
pub mod dataset;
pub mod error;
pub mod fragment;
pub mod params;
pub mod participant;
pub mod schema;
pub mod search_term;
pub mod warehouse;

pub use compiler::{compile, CriteriaCompiler};
pub use criteria_search::build_criteria_search_query;
pub use dataset::linking::{LinkingCache, ValuesLinkingPair};
pub use dataset::DatasetQueryBuilder;
pub use error::{Error, Result};
pub use fragment::Sql;
pub use params::{rekey, CompiledQuery, ParamType, ParamValue, ParameterNamespace};
pub use participant::ParticipantQueryBuilder;
pub use schema::{DomainTable, SchemaConfig};
pub use search_term::{normalize, SearchTerm, StopWords};
pub use warehouse::{substitute_placeholders, ConceptCatalog, Row, WarehouseClient};
