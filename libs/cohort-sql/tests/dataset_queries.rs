use async_trait::async_trait;
use cohortql_model::{
    CohortReference, ConceptSet, DatasetRequest, Domain, DomainValuePair, PrePackagedConceptSet,
};
use cohortql_sql::{
    CompiledQuery, ConceptCatalog, DatasetQueryBuilder, Error, LinkingCache, ParamValue, Result,
    Row, SchemaConfig, WarehouseClient,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers linking lookups from a fixed table, counting calls.
struct FakeWarehouse {
    rows: Vec<(String, String, String)>,
    calls: AtomicUsize,
}

impl FakeWarehouse {
    fn new() -> Self {
        let row = |domain: &str, name: &str, sql: &str, join: &str| {
            (
                domain.to_string(),
                format!("{}|{}", name, sql),
                join.to_string(),
            )
        };
        Self {
            rows: vec![
                row(
                    "Condition",
                    "CORE_TABLE_FOR_DOMAIN",
                    "CORE_TABLE_FOR_DOMAIN",
                    "FROM `${projectId}.${dataSetId}.condition_occurrence` c_occurrence",
                ),
                row(
                    "Condition",
                    "PERSON_ID",
                    "c_occurrence.PERSON_ID",
                    "FROM `${projectId}.${dataSetId}.condition_occurrence` c_occurrence",
                ),
                row(
                    "Condition",
                    "STANDARD_CONCEPT_NAME",
                    "c_standard_concept.concept_name as STANDARD_CONCEPT_NAME",
                    "LEFT JOIN `${projectId}.${dataSetId}.concept` c_standard_concept on c_occurrence.CONDITION_CONCEPT_ID = c_standard_concept.CONCEPT_ID",
                ),
                row(
                    "Person",
                    "CORE_TABLE_FOR_DOMAIN",
                    "CORE_TABLE_FOR_DOMAIN",
                    "FROM `${projectId}.${dataSetId}.person` person",
                ),
                row(
                    "Person",
                    "GENDER_CONCEPT_ID",
                    "person.GENDER_CONCEPT_ID",
                    "FROM `${projectId}.${dataSetId}.person` person",
                ),
                row(
                    "Survey",
                    "CORE_TABLE_FOR_DOMAIN",
                    "CORE_TABLE_FOR_DOMAIN",
                    "FROM `${projectId}.${dataSetId}.ds_survey` answer",
                ),
                row(
                    "Survey",
                    "QUESTION",
                    "answer.question",
                    "FROM `${projectId}.${dataSetId}.ds_survey` answer",
                ),
            ],
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseClient for FakeWarehouse {
    async fn execute_query(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let domain = match query.parameter("pDomain") {
            Some(ParamValue::Scalar { value, .. }) => value.clone(),
            other => return Err(Error::Warehouse(format!("bad pDomain: {:?}", other))),
        };
        let names = match query.parameter("pValuesList") {
            Some(ParamValue::Array { values, .. }) => values.clone(),
            other => return Err(Error::Warehouse(format!("bad pValuesList: {:?}", other))),
        };

        Ok(self
            .rows
            .iter()
            .filter(|(d, key, _)| {
                *d == domain && names.iter().any(|n| key.starts_with(&format!("{}|", n)))
            })
            .map(|(_, key, join)| {
                let sql = key.split_once('|').map(|(_, s)| s).unwrap_or_default();
                match json!({ "OMOP_SQL": sql, "JOIN_VALUE": join }) {
                    serde_json::Value::Object(map) => map,
                    _ => unreachable!(),
                }
            })
            .collect())
    }

    fn filter_config(&self, query: CompiledQuery) -> CompiledQuery {
        query
    }
}

struct FakeCatalog(Vec<i64>);

#[async_trait]
impl ConceptCatalog for FakeCatalog {
    async fn survey_question_concept_ids(&self) -> Result<Vec<i64>> {
        Ok(self.0.clone())
    }
}

fn builder(warehouse: Arc<FakeWarehouse>) -> DatasetQueryBuilder {
    DatasetQueryBuilder::new(
        SchemaConfig::default(),
        warehouse,
        Arc::new(FakeCatalog(vec![1585855, 1585710])),
    )
}

const MALE: &str = r#"{ "includes": [{ "items": [{
    "type": "DEMO", "searchParameters": [{ "subtype": "GEN", "conceptId": 8507 }]
}]}]}"#;

const DIABETES: &str = r#"{ "includes": [{ "items": [{
    "type": "ICD10", "searchParameters": [{ "domain": "Condition", "value": "E11.9" }]
}]}]}"#;

fn condition_request() -> DatasetRequest {
    DatasetRequest {
        cohorts: vec![
            CohortReference {
                id: 1,
                criteria: Some(MALE.to_string()),
            },
            CohortReference {
                id: 2,
                criteria: Some(DIABETES.to_string()),
            },
        ],
        concept_sets: vec![ConceptSet {
            name: Some("Diabetes".into()),
            domain: Domain::Condition,
            concept_ids: [201826, 4193704].into_iter().collect(),
        }],
        values: vec![
            DomainValuePair::new(Domain::Condition, "person_id"),
            DomainValuePair::new(Domain::Condition, "standard_concept_name"),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn condition_domain_query() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let queries = builder(warehouse.clone())
        .build_per_domain_queries(&condition_request())
        .await
        .unwrap();

    assert_eq!(queries.len(), 1);
    let query = &queries[&Domain::Condition];

    assert!(query.sql().starts_with(
        "SELECT c_occurrence.PERSON_ID, c_standard_concept.concept_name as STANDARD_CONCEPT_NAME \
         FROM `${projectId}.${dataSetId}.condition_occurrence` c_occurrence \
         LEFT JOIN `${projectId}.${dataSetId}.concept` c_standard_concept on c_occurrence.CONDITION_CONCEPT_ID = c_standard_concept.CONCEPT_ID \
         WHERE \n(condition_concept_id IN (201826, 4193704) OR \ncondition_source_concept_id IN (201826, 4193704)) \
         \nAND (c_occurrence.PERSON_ID IN (select person_id\n"
    ));
    assert!(query.sql().contains(")\n UNION DISTINCT select person_id\n"));
    assert!(query.sql().contains("p.gender_concept_id = @gen0_1\n"));
    assert!(query.sql().contains("in unnest(@Condition0_2)"));

    assert_eq!(query.parameter("gen0_1"), Some(&ParamValue::int64(8507)));
    assert_eq!(query.parameter("cmICD100_2"), Some(&ParamValue::string("ICD10CM")));
    assert!(query.parameter("gen0").is_none());
    assert_eq!(warehouse.calls(), 1);
}

#[tokio::test]
async fn include_all_skips_cohort_filter() {
    let request = DatasetRequest {
        cohorts: vec![],
        includes_all_participants: true,
        ..condition_request()
    };
    let queries = builder(Arc::new(FakeWarehouse::new()))
        .build_per_domain_queries(&request)
        .await
        .unwrap();

    let query = &queries[&Domain::Condition];
    assert!(query
        .sql()
        .ends_with("condition_source_concept_id IN (201826, 4193704))"));
    assert!(query.parameters().is_empty());
}

#[tokio::test]
async fn person_domain_has_no_concept_filter() {
    let request = DatasetRequest {
        cohorts: vec![CohortReference {
            id: 9,
            criteria: Some(MALE.to_string()),
        }],
        concept_sets: vec![],
        pre_packaged_concept_set: PrePackagedConceptSet::Demographics,
        values: vec![DomainValuePair::new(Domain::Person, "gender_concept_id")],
        ..Default::default()
    };
    let queries = builder(Arc::new(FakeWarehouse::new()))
        .build_per_domain_queries(&request)
        .await
        .unwrap();

    let query = &queries[&Domain::Person];
    assert!(query.sql().starts_with(
        "SELECT person.GENDER_CONCEPT_ID FROM `${projectId}.${dataSetId}.person` person \
         \nWHERE person.PERSON_ID IN (select person_id\n"
    ));
    assert!(!query.sql().contains("concept_id IN ("));
}

#[tokio::test]
async fn survey_pre_packaged_set_supplies_ids() {
    let request = DatasetRequest {
        includes_all_participants: true,
        pre_packaged_concept_set: PrePackagedConceptSet::Survey,
        values: vec![DomainValuePair::new(Domain::Survey, "question")],
        ..Default::default()
    };
    let queries = builder(Arc::new(FakeWarehouse::new()))
        .build_per_domain_queries(&request)
        .await
        .unwrap();

    assert_eq!(
        queries[&Domain::Survey].sql(),
        "SELECT answer.question FROM `${projectId}.${dataSetId}.ds_survey` answer \
         WHERE \n(question_concept_id IN (1585710, 1585855) OR \nquestion_concept_id IN (1585710, 1585855))"
    );
}

#[tokio::test]
async fn no_cohorts_is_rejected_before_any_lookup() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let request = DatasetRequest {
        cohorts: vec![],
        ..condition_request()
    };
    let err = builder(warehouse.clone())
        .build_per_domain_queries(&request)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Invalid criteria: Data Sets must include at least one cohort and concept."
    );
    assert_eq!(warehouse.calls(), 0);
}

#[tokio::test]
async fn empty_concept_set_is_rejected() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let mut request = condition_request();
    request.concept_sets[0].concept_ids.clear();

    let err = builder(warehouse.clone())
        .build_per_domain_queries(&request)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidCriteria(_)));
    assert_eq!(warehouse.calls(), 0);
}

#[tokio::test]
async fn requested_domain_without_concepts_never_emits_empty_list() {
    let mut request = condition_request();
    request.concept_sets[0].domain = Domain::Drug;

    let err = builder(Arc::new(FakeWarehouse::new()))
        .build_per_domain_queries(&request)
        .await
        .unwrap_err();
    assert!(err.is_user_error());
}

#[tokio::test]
async fn missing_cohort_definition_is_not_found() {
    let mut request = condition_request();
    request.cohorts[1].criteria = Some("null".to_string());

    let err = builder(Arc::new(FakeWarehouse::new()))
        .build_per_domain_queries(&request)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Not Found: No Cohort definition matching cohortId: 2"
    );
}

#[tokio::test]
async fn linking_cache_avoids_second_lookup() {
    let warehouse = Arc::new(FakeWarehouse::new());
    let cache = Arc::new(LinkingCache::new(NonZeroUsize::new(8).unwrap()));
    let builder = builder(warehouse.clone()).with_linking_cache(cache.clone());

    let first = builder
        .build_per_domain_queries(&condition_request())
        .await
        .unwrap();
    let second = builder
        .build_per_domain_queries(&condition_request())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(warehouse.calls(), 1);
    assert_eq!(cache.len(), 1);
}
