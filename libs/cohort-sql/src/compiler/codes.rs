//! Source-code items (ICD9, ICD10, CPT), matched through the concept table.

use super::{bucket_by_domain, DomainBody};
use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::{ParamType, ParamValue};
use crate::schema::SchemaConfig;
use cohortql_model::{CodeCriteria, CodeVocabulary};

/// The two vocabularies a code family spans (diagnosis, procedure).
pub(super) fn vocabularies(vocabulary: CodeVocabulary) -> (&'static str, &'static str) {
    match vocabulary {
        CodeVocabulary::Icd9 => ("ICD9CM", "ICD9Proc"),
        CodeVocabulary::Icd10 => ("ICD10CM", "ICD10PCS"),
        CodeVocabulary::Cpt => ("CPT4", "HCPCS"),
    }
}

pub(super) fn domain_bodies(
    vocabulary: CodeVocabulary,
    criteria: &CodeCriteria,
    schema: &SchemaConfig,
) -> Result<Vec<DomainBody>> {
    let (cm, proc) = vocabularies(vocabulary);
    let family = vocabulary.as_str();
    let mut bodies = Vec::new();

    for (domain, params) in bucket_by_domain(&criteria.search_parameters, |p| p.domain) {
        let occurrence = schema.table(domain)?;
        let (_, source_column) = schema.concept_columns(domain)?;
        let base = domain.title();

        let mut leaves = Vec::new();
        let mut parents = Vec::new();
        for param in params {
            let code = param.value.trim();
            if code.is_empty() {
                return Err(Error::InvalidCriteria(format!(
                    "{} search parameter has an empty code",
                    family
                )));
            }
            if param.is_group_concept {
                parents.push(format!("{}%", code));
            } else {
                leaves.push(code.to_string());
            }
        }

        let mut sql = Sql::text(format!(
            "from {} a, {} b\nwhere a.{} = b.concept_id\nand b.vocabulary_id in (",
            table(&occurrence.table),
            table("concept"),
            source_column
        ));
        sql.push_param(&format!("cm{}", family), ParamValue::string(cm))
            .push_str(",")
            .push_param(&format!("proc{}", family), ParamValue::string(proc))
            .push_str(")\n");

        let mut matches = Vec::new();
        if !leaves.is_empty() {
            let mut m = Sql::text("b.concept_code in unnest(");
            m.push_param(base, ParamValue::array(ParamType::String, leaves))
                .push_str(")");
            matches.push(m);
        }
        for prefix in parents {
            let mut m = Sql::text("b.concept_code like ");
            m.push_param(base, ParamValue::string(prefix));
            matches.push(m);
        }
        if matches.len() == 1 {
            sql.append(Sql::join(matches, "").wrap("and ", "\n"));
        } else {
            sql.append(Sql::join(matches, " or ").wrap("and (", ")\n"));
        }

        bodies.push(DomainBody {
            domain,
            from_where: sql,
            concept_column: source_column.to_string(),
        });
    }

    Ok(bodies)
}
