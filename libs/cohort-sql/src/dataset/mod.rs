//! Per-domain export queries for a dataset request.
//!
//! A dataset combines cohorts (who) with concept sets (which events) and value
//! columns (what to export). For every requested domain the builder emits one
//! query selecting the linked value columns, filtered to the chosen concepts and,
//! unless every participant is included, to the union of the cohorts.

pub mod linking;

use crate::error::{Error, Result};
use crate::params::{rekey, CompiledQuery};
use crate::participant::ParticipantQueryBuilder;
use crate::schema::SchemaConfig;
use crate::warehouse::{ConceptCatalog, WarehouseClient};
use cohortql_model::{ConceptSet, DatasetRequest, Domain, SearchRequest};
use futures::future::try_join_all;
use linking::{LinkingCache, ValuesLinkingPair};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use linking::{capitalize_first_character_only, CORE_TABLE_FOR_DOMAIN};

const ALL_SURVEYS: &str = "All Surveys";

pub struct DatasetQueryBuilder {
    schema: SchemaConfig,
    warehouse: Arc<dyn WarehouseClient>,
    catalog: Arc<dyn ConceptCatalog>,
    linking_cache: Option<Arc<LinkingCache>>,
}

/// Cohort filter shared by every domain query.
struct CohortUnion {
    sql: String,
    parameters: BTreeMap<String, crate::params::ParamValue>,
}

impl DatasetQueryBuilder {
    pub fn new(
        schema: SchemaConfig,
        warehouse: Arc<dyn WarehouseClient>,
        catalog: Arc<dyn ConceptCatalog>,
    ) -> Self {
        Self {
            schema,
            warehouse,
            catalog,
            linking_cache: None,
        }
    }

    /// Reuse linking lookups across requests.
    pub fn with_linking_cache(mut self, cache: Arc<LinkingCache>) -> Self {
        self.linking_cache = Some(cache);
        self
    }

    pub fn schema(&self) -> &SchemaConfig {
        &self.schema
    }

    /// Build one export query per requested domain.
    pub async fn build_per_domain_queries(
        &self,
        request: &DatasetRequest,
    ) -> Result<BTreeMap<Domain, CompiledQuery>> {
        validate(request)?;

        let mut concept_sets: Vec<ConceptSet> = request.concept_sets.clone();
        if request.pre_packaged_concept_set.includes_survey() {
            let ids = self.catalog.survey_question_concept_ids().await?;
            concept_sets.push(ConceptSet {
                name: Some(ALL_SURVEYS.to_string()),
                domain: Domain::Survey,
                concept_ids: ids.into_iter().collect(),
            });
        }
        check_concept_sets(&concept_sets)?;

        let cohorts = if request.includes_all_participants {
            None
        } else {
            Some(self.cohort_union(request)?)
        };

        let domains = request.domains();
        let lookups = domains.iter().map(|&domain| {
            let values: Vec<String> = request
                .values
                .iter()
                .filter(|v| v.domain == domain)
                .map(|v| v.value.clone())
                .collect();
            let warehouse = Arc::clone(&self.warehouse);
            let cache = self.linking_cache.clone();
            async move {
                linking::resolve_cached(warehouse.as_ref(), cache.as_deref(), domain, &values)
                    .await
            }
        });
        let pairs = try_join_all(lookups).await?;

        let mut queries = BTreeMap::new();
        for (domain, pair) in domains.into_iter().zip(pairs) {
            let query = self.domain_query(domain, &pair, &concept_sets, cohorts.as_ref())?;
            queries.insert(domain, query);
        }

        tracing::info!(
            domains = queries.len(),
            cohorts = request.cohorts.len(),
            includes_all = request.includes_all_participants,
            "Assembled dataset queries"
        );
        Ok(queries)
    }

    fn cohort_union(&self, request: &DatasetRequest) -> Result<CohortUnion> {
        let builder = ParticipantQueryBuilder::new(&self.schema);
        let mut sql = Vec::with_capacity(request.cohorts.len());
        let mut parameters = BTreeMap::new();

        for cohort in &request.cohorts {
            let criteria = cohort.criteria.as_deref().ok_or_else(|| {
                Error::NotFound(format!(
                    "No Cohort definition matching cohortId: {}",
                    cohort.id
                ))
            })?;
            let search: Option<SearchRequest> = serde_json::from_str(criteria)?;
            let search = search.ok_or_else(|| {
                Error::NotFound(format!(
                    "No Cohort definition matching cohortId: {}",
                    cohort.id
                ))
            })?;

            let query = rekey(
                &builder.person_id_query(&search)?,
                &cohort.id.to_string(),
            )?;
            tracing::debug!(cohort_id = cohort.id, "Compiled cohort participant query");
            let (cohort_sql, cohort_params) = query.into_parts();
            sql.push(cohort_sql);
            parameters.extend(cohort_params);
        }

        Ok(CohortUnion {
            sql: sql.join(" UNION DISTINCT "),
            parameters,
        })
    }

    fn domain_query(
        &self,
        domain: Domain,
        pair: &ValuesLinkingPair,
        concept_sets: &[ConceptSet],
        cohorts: Option<&CohortUnion>,
    ) -> Result<CompiledQuery> {
        let mut sql = format!("SELECT {} {}", pair.selects.join(", "), pair.joins.join(" "));
        let person_id = format!("{}.PERSON_ID", self.schema.alias(domain)?);

        if domain == Domain::Person {
            if let Some(cohorts) = cohorts {
                sql.push_str(&format!(" \nWHERE {} IN ({})", person_id, cohorts.sql));
            }
        } else {
            let (standard, source) = self.schema.concept_columns(domain)?;
            let ids: BTreeSet<i64> = concept_sets
                .iter()
                .filter(|cs| cs.domain == domain)
                .flat_map(|cs| cs.concept_ids.iter().copied())
                .collect();
            if ids.is_empty() {
                tracing::warn!(domain = %domain, "Rejected dataset domain without concepts");
                return Err(Error::InvalidCriteria(format!(
                    "Concept Sets must contain at least one concept for domain: {}",
                    domain
                )));
            }
            let ids = ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(
                " WHERE \n({} IN ({}) OR \n{} IN ({}))",
                standard, ids, source, ids
            ));
            if let Some(cohorts) = cohorts {
                sql.push_str(&format!(" \nAND ({} IN ({}))", person_id, cohorts.sql));
            }
        }

        let parameters = cohorts.map(|c| c.parameters.clone()).unwrap_or_default();
        tracing::debug!(domain = %domain, "Assembled dataset domain query");
        Ok(CompiledQuery::new(sql, parameters))
    }
}

fn validate(request: &DatasetRequest) -> Result<()> {
    let no_cohorts = request.cohorts.is_empty() && !request.includes_all_participants;
    let no_concepts = request.concept_sets.is_empty()
        && request.pre_packaged_concept_set == cohortql_model::PrePackagedConceptSet::None
        && request.values.is_empty();
    if no_cohorts || no_concepts {
        tracing::warn!(no_cohorts, no_concepts, "Rejected dataset request");
        return Err(Error::InvalidCriteria(
            "Data Sets must include at least one cohort and concept.".to_string(),
        ));
    }
    if let Some(cohort) = request.cohorts.iter().find(|c| c.id <= 0) {
        return Err(Error::InvalidCriteria(format!(
            "Invalid cohortId: {}",
            cohort.id
        )));
    }
    Ok(())
}

/// Every domain that has concept sets must have at least one concept among them.
fn check_concept_sets(concept_sets: &[ConceptSet]) -> Result<()> {
    let mut totals: BTreeMap<Domain, usize> = BTreeMap::new();
    for cs in concept_sets.iter().filter(|cs| cs.domain != Domain::Person) {
        *totals.entry(cs.domain).or_default() += cs.concept_ids.len();
    }
    if totals.values().any(|&n| n == 0) {
        return Err(Error::InvalidCriteria(
            "Concept Sets must contain at least one concept".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cohortql_model::{CohortReference, PrePackagedConceptSet};

    fn concept_set(domain: Domain, ids: &[i64]) -> ConceptSet {
        ConceptSet {
            name: None,
            domain,
            concept_ids: ids.iter().copied().collect(),
        }
    }

    #[test]
    fn validate_requires_cohort_or_everyone() {
        let request = DatasetRequest {
            concept_sets: vec![concept_set(Domain::Condition, &[1])],
            ..Default::default()
        };
        assert!(validate(&request).is_err());

        let everyone = DatasetRequest {
            includes_all_participants: true,
            ..request
        };
        assert!(validate(&everyone).is_ok());
    }

    #[test]
    fn validate_accepts_pre_packaged_only() {
        let request = DatasetRequest {
            cohorts: vec![CohortReference {
                id: 1,
                criteria: None,
            }],
            pre_packaged_concept_set: PrePackagedConceptSet::Demographics,
            ..Default::default()
        };
        assert!(validate(&request).is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_cohort_ids() {
        let request = DatasetRequest {
            cohorts: vec![CohortReference {
                id: -3,
                criteria: None,
            }],
            pre_packaged_concept_set: PrePackagedConceptSet::Demographics,
            ..Default::default()
        };
        let err = validate(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidCriteria(_)));
    }

    #[test]
    fn empty_concept_set_domain_is_rejected() {
        let sets = vec![
            concept_set(Domain::Condition, &[]),
            concept_set(Domain::Drug, &[1]),
        ];
        let err = check_concept_sets(&sets).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid criteria: Concept Sets must contain at least one concept"
        );
    }

    #[test]
    fn sets_in_one_domain_are_summed() {
        let sets = vec![
            concept_set(Domain::Condition, &[]),
            concept_set(Domain::Condition, &[7]),
        ];
        assert!(check_concept_sets(&sets).is_ok());
    }
}
