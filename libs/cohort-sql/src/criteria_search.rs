//! Criteria lookup over the `cb_criteria` catalog table.

use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::{CompiledQuery, ParamType, ParamValue, ParameterNamespace};
use crate::search_term::{SearchTerm, StopWords};
use cohortql_model::Domain;

/// Build the criteria search for `term` within `domain`.
///
/// Numeric codes match `code` by prefix; anything else goes through the
/// full-text index in boolean mode.
pub fn build_criteria_search_query(
    domain: Domain,
    standard: bool,
    term: &str,
    limit: u64,
    stop_words: &StopWords,
) -> Result<CompiledQuery> {
    let search = SearchTerm::parse(term, stop_words);

    let mut sql = Sql::text(format!("select * from {}\nwhere domain_id = ", table("cb_criteria")));
    sql.push_param("domain", ParamValue::string(domain.as_str()))
        .push_str("\nand is_standard = ")
        .push_param(
            "standard",
            ParamValue::scalar(ParamType::Bool, standard.to_string()),
        )
        .push_str("\n");

    match search {
        SearchTerm::Empty => {
            tracing::warn!(term = %term, "Rejected search term without searchable words");
            return Err(Error::InvalidCriteria(format!(
                "search term '{}' contains no searchable words",
                term
            )));
        }
        SearchTerm::Like(pattern) => {
            sql.push_str("and code like ")
                .push_param("term", ParamValue::string(pattern))
                .push_str("\n");
        }
        SearchTerm::Match(expression) => {
            sql.push_str("and match(full_text) against(")
                .push_param("term", ParamValue::string(expression))
                .push_str(" in boolean mode)\n");
        }
    }
    sql.push_str(&format!("order by est_count desc\nlimit {}", limit));

    Ok(sql.render(&mut ParameterNamespace::new()))
}
