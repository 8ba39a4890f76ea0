use cohortql_model::Domain;
use cohortql_sql::{build_criteria_search_query, normalize, SearchTerm, StopWords};
use quickcheck::{QuickCheck, TestResult};

/// Property: normalizing the same input twice gives the same output
#[test]
fn prop_normalize_is_deterministic() {
    fn prop(s: String) -> TestResult {
        let stop_words = StopWords::default();
        TestResult::from_bool(normalize(&s, &stop_words) == normalize(&s, &stop_words))
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(String) -> TestResult);
}

/// Property: output is empty, a LIKE prefix, or a boolean-mode expression
#[test]
fn prop_normalize_output_shape() {
    fn prop(s: String) -> TestResult {
        let out = normalize(&s, &StopWords::default());
        TestResult::from_bool(
            out.is_empty() || out.ends_with('%') || out.starts_with('+') || out.starts_with('-'),
        )
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(String) -> TestResult);
}

/// Property: a search query is built exactly when the term has searchable words
#[test]
fn prop_search_query_iff_searchable() {
    fn prop(s: String) -> TestResult {
        let stop_words = StopWords::default();
        let searchable = !SearchTerm::parse(&s, &stop_words).is_empty();
        let built = build_criteria_search_query(Domain::Condition, true, &s, 10, &stop_words);
        TestResult::from_bool(built.is_ok() == searchable)
    }

    QuickCheck::new()
        .tests(200)
        .quickcheck(prop as fn(String) -> TestResult);
}

#[test]
fn literal_cases() {
    let stop_words = StopWords::default();
    assert_eq!(normalize("lung can", &stop_words), "+\"lung\"+can*");
    assert_eq!(normalize("001.1", &stop_words), "001.1%");
    assert_eq!(normalize("the", &stop_words), "");
    assert_eq!(normalize("the", &StopWords::none()), "+the*");
}
