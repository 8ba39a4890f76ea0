//! Concept-id items matched directly against a domain's concept columns.

use super::operators::push_comparison;
use super::{bucket_by_domain, DomainBody};
use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::{ParamType, ParamValue};
use crate::schema::SchemaConfig;
use cohortql_model::{Attribute, AttributeName, ConceptCriteria, Domain};

enum Clause<'a> {
    /// Plain concept ids sharing a column and hierarchy mode
    Ids {
        group: bool,
        column: &'a str,
        ids: Vec<i64>,
    },
    Attribute(Sql),
}

pub(super) fn domain_bodies(
    criteria: &ConceptCriteria,
    schema: &SchemaConfig,
) -> Result<Vec<DomainBody>> {
    let mut bodies = Vec::new();

    for (domain, params) in bucket_by_domain(&criteria.search_parameters, |p| p.domain) {
        if matches!(domain, Domain::Person | Domain::Death) {
            return Err(Error::InvalidCriteria(format!(
                "Concept criteria are not supported for domain: {}",
                domain
            )));
        }
        let occurrence = schema.table(domain)?;
        let base = domain.title();

        let mut clauses: Vec<Clause<'_>> = Vec::new();
        for param in &params {
            let column = schema.concept_column(domain, param.uses_source_concept)?;
            if param.attributes.is_empty() {
                let existing = clauses.iter_mut().find_map(|c| match c {
                    Clause::Ids {
                        group,
                        column: col,
                        ids,
                    } if *group == param.is_group_concept && *col == column => Some(ids),
                    _ => None,
                });
                match existing {
                    Some(ids) => ids.push(param.concept_id),
                    None => clauses.push(Clause::Ids {
                        group: param.is_group_concept,
                        column,
                        ids: vec![param.concept_id],
                    }),
                }
                continue;
            }

            let (paired, plain): (Vec<&Attribute>, Vec<&Attribute>) = param
                .attributes
                .iter()
                .partition(|a| a.concept_id.is_some());
            for attribute in plain {
                let reading = Reading {
                    alias: "a",
                    column,
                    value_concept_column: &occurrence.value_concept_column,
                    concept_id: param.concept_id,
                };
                clauses.push(Clause::Attribute(
                    reading.predicate(domain, attribute)?.wrap("(", ")"),
                ));
            }
            if !paired.is_empty() {
                let entry_date = schema.entry_date_column(domain)?;
                clauses.push(Clause::Attribute(paired_clause(
                    domain,
                    &occurrence.table,
                    column,
                    &occurrence.value_concept_column,
                    entry_date,
                    &paired,
                )?));
            }
        }

        let rendered: Vec<Sql> = clauses
            .into_iter()
            .map(|clause| match clause {
                Clause::Ids { group, column, ids } => ids_clause(base, group, column, ids),
                Clause::Attribute(sql) => sql,
            })
            .collect();

        let mut sql = Sql::text(format!("from {} a\nwhere ", table(&occurrence.table)));
        sql.append(Sql::join(rendered, " or\n").wrap("(", ")\n"));

        let all_source = params.iter().all(|p| p.uses_source_concept);
        bodies.push(DomainBody {
            domain,
            from_where: sql,
            concept_column: schema.concept_column(domain, all_source)?.to_string(),
        });
    }

    Ok(bodies)
}

fn ids_clause(base: &str, group: bool, column: &str, ids: Vec<i64>) -> Sql {
    let mut sql = if group {
        Sql::text(format!(
            "a.{} in (select descendant_concept_id\nfrom {}\nwhere ancestor_concept_id in unnest(",
            column,
            table("concept_ancestor")
        ))
    } else {
        Sql::text(format!("a.{} in unnest(", column))
    };
    sql.push_param(base, ParamValue::int64_array(ids));
    sql.push_str(if group { "))" } else { ")" });
    sql
}

/// One row of an occurrence table matched by concept and attribute value.
struct Reading<'a> {
    alias: &'a str,
    column: &'a str,
    value_concept_column: &'a str,
    concept_id: i64,
}

impl Reading<'_> {
    fn predicate(&self, domain: Domain, attribute: &Attribute) -> Result<Sql> {
        let base = domain.title();
        let concept_id = attribute.concept_id.unwrap_or(self.concept_id);
        let context = format!("{} {:?} attribute", domain.title(), attribute.name);

        let mut sql = Sql::text(format!("{}.{} = ", self.alias, self.column));
        sql.push_param(base, ParamValue::int64(concept_id));

        let (value_column, param_type) = match attribute.name {
            AttributeName::Any => return Ok(sql),
            AttributeName::Num => ("value_as_number", ParamType::Float64),
            AttributeName::Cat => (self.value_concept_column, ParamType::Int64),
        };
        sql.push_str(&format!(" and {}.{} ", self.alias, value_column));
        push_comparison(
            &mut sql,
            &context,
            base,
            attribute.operator,
            &attribute.operands,
            param_type,
        )?;
        Ok(sql)
    }
}

/// Attributes carrying their own concept id (systolic/diastolic) must all hold.
///
/// The first reading is matched on `a`; each further one needs a row of the
/// same person taken on the same date.
fn paired_clause(
    domain: Domain,
    occurrence_table: &str,
    column: &str,
    value_concept_column: &str,
    entry_date: &str,
    attributes: &[&Attribute],
) -> Result<Sql> {
    let mut sql = Sql::new();
    for (i, attribute) in attributes.iter().enumerate() {
        let alias = if i == 0 { "a".to_string() } else { format!("b{}", i) };
        let reading = Reading {
            alias: &alias,
            column,
            value_concept_column,
            concept_id: attribute.concept_id.unwrap_or_default(),
        };
        let predicate = reading.predicate(domain, attribute)?;
        if i == 0 {
            sql.append(predicate);
            continue;
        }
        sql.push_str(&format!(
            " and exists (select 'x' from {} {alias}\nwhere {alias}.person_id = a.person_id and {alias}.{date} = a.{date} and ",
            table(occurrence_table),
            alias = alias,
            date = entry_date,
        ));
        sql.append(predicate);
        sql.push_str(")");
    }
    Ok(sql.wrap("(", ")"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterNamespace;
    use cohortql_model::{ConceptParameter, Operator};
    use pretty_assertions::assert_eq;

    fn param(domain: Domain, concept_id: i64) -> ConceptParameter {
        ConceptParameter {
            domain,
            concept_id,
            is_group_concept: false,
            uses_source_concept: false,
            attributes: vec![],
        }
    }

    fn render_single(criteria: &ConceptCriteria) -> crate::params::CompiledQuery {
        let mut bodies = domain_bodies(criteria, &SchemaConfig::default()).unwrap();
        assert_eq!(bodies.len(), 1);
        bodies
            .remove(0)
            .from_where
            .render(&mut ParameterNamespace::new())
    }

    #[test]
    fn leaves_and_groups_split_into_clauses() {
        let mut parent = param(Domain::Drug, 21600001);
        parent.is_group_concept = true;
        let criteria = ConceptCriteria {
            search_parameters: vec![param(Domain::Drug, 1), parent, param(Domain::Drug, 2)],
        };

        let query = render_single(&criteria);

        assert_eq!(
            query.sql(),
            "from `${projectId}.${dataSetId}.drug_exposure` a\n\
             where (a.drug_concept_id in unnest(@Drug0) or\n\
             a.drug_concept_id in (select descendant_concept_id\n\
             from `${projectId}.${dataSetId}.concept_ancestor`\n\
             where ancestor_concept_id in unnest(@Drug1)))\n"
        );
        assert_eq!(query.parameter("Drug0"), Some(&ParamValue::int64_array([1, 2])));
    }

    #[test]
    fn source_concepts_use_source_column() {
        let mut source = param(Domain::Condition, 44829696);
        source.uses_source_concept = true;
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![source],
        });
        assert!(query
            .sql()
            .contains("where (a.condition_source_concept_id in unnest(@Condition0))\n"));
    }

    #[test]
    fn numeric_attribute() {
        let mut p = param(Domain::Measurement, 3004410);
        p.attributes.push(Attribute {
            name: AttributeName::Num,
            operator: Operator::Between,
            operands: vec!["5".into(), "7.0".into()],
            concept_id: None,
        });
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![p],
        });

        assert!(query.sql().contains(
            "where ((a.measurement_concept_id = @Measurement0 and a.value_as_number between @Measurement1 and @Measurement2))\n"
        ));
        assert_eq!(
            query.parameter("Measurement2"),
            Some(&ParamValue::scalar(ParamType::Float64, "7"))
        );
    }

    #[test]
    fn survey_answers_use_value_source_column() {
        let mut p = param(Domain::Survey, 1585855);
        p.attributes.push(Attribute {
            name: AttributeName::Cat,
            operator: Operator::In,
            operands: vec!["1585856".into()],
            concept_id: None,
        });
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![p],
        });
        assert!(query
            .sql()
            .contains("and a.value_source_concept_id in unnest(@Survey1)"));
    }

    #[test]
    fn attribute_concept_overrides_parameter() {
        let mut p = param(Domain::Measurement, 903118);
        p.attributes.push(Attribute {
            name: AttributeName::Num,
            operator: Operator::LessThanOrEqualTo,
            operands: vec!["90".into()],
            concept_id: Some(903115),
        });
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![p],
        });
        assert_eq!(
            query.parameter("Measurement0"),
            Some(&ParamValue::int64(903115))
        );
    }

    fn reading(value: &str, concept_id: i64) -> Attribute {
        Attribute {
            name: AttributeName::Num,
            operator: Operator::GreaterThan,
            operands: vec![value.into()],
            concept_id: Some(concept_id),
        }
    }

    #[test]
    fn blood_pressure_readings_must_all_hold() {
        let mut p = param(Domain::Measurement, 903118);
        p.attributes = vec![reading("140", 903118), reading("90", 903115)];
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![p],
        });

        assert_eq!(
            query.sql(),
            "from `${projectId}.${dataSetId}.measurement` a\n\
             where ((a.measurement_concept_id = @Measurement0 and a.value_as_number > @Measurement1 \
             and exists (select 'x' from `${projectId}.${dataSetId}.measurement` b1\n\
             where b1.person_id = a.person_id and b1.measurement_date = a.measurement_date \
             and b1.measurement_concept_id = @Measurement2 and b1.value_as_number > @Measurement3)))\n"
        );
        assert_eq!(
            query.parameter("Measurement2"),
            Some(&ParamValue::int64(903115))
        );
        assert_eq!(
            query.parameter("Measurement3"),
            Some(&ParamValue::scalar(ParamType::Float64, "90"))
        );
    }

    #[test]
    fn plain_attributes_stay_alternatives_beside_readings() {
        let mut p = param(Domain::Measurement, 903118);
        p.attributes = vec![
            reading("140", 903118),
            Attribute {
                name: AttributeName::Cat,
                operator: Operator::In,
                operands: vec!["45876384".into()],
                concept_id: None,
            },
        ];
        let query = render_single(&ConceptCriteria {
            search_parameters: vec![p],
        });
        assert!(query.sql().contains(
            "where ((a.measurement_concept_id = @Measurement0 and a.value_as_concept_id in unnest(@Measurement1)) or\n\
             (a.measurement_concept_id = @Measurement2 and a.value_as_number > @Measurement3))\n"
        ));
    }

    #[test]
    fn person_and_death_concepts_are_user_errors() {
        for domain in [Domain::Person, Domain::Death] {
            let err = domain_bodies(
                &ConceptCriteria {
                    search_parameters: vec![param(domain, 8507)],
                },
                &SchemaConfig::default(),
            )
            .unwrap_err();
            assert!(matches!(err, Error::InvalidCriteria(_)));
            assert!(err.is_user_error());
        }
    }
}
