//! Criteria tree → SQL predicate compiler.
//!
//! Compiles a [`SearchRequest`] into a predicate over the `person` table aliased
//! as `person`:
//!
//! - every include group becomes `person.person_id in (<items>)`
//! - every exclude group becomes a correlated `not exists` against the same shape
//! - items inside a group are combined with `union all`
//! - groups are joined with `and`, in input order
//!
//! Builders produce [`Sql`] fragments whose parameters are unnamed slots; names
//! are only assigned when the finished predicate is rendered.

mod codes;
mod concepts;
mod demographics;
mod modifiers;
pub(crate) mod operators;
mod temporal;

use crate::error::{Error, Result};
use crate::fragment::{table, Sql};
use crate::params::{CompiledQuery, ParameterNamespace};
use crate::schema::SchemaConfig;
use cohortql_model::{CodeVocabulary, Domain, ItemCriteria, SearchGroup, SearchGroupItem, SearchRequest};
use modifiers::ItemModifiers;

/// What an item query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    /// `person_id` only
    Participants,
    /// `person_id, visit_occurrence_id, entry_date` for temporal pairing
    Events,
}

pub struct CriteriaCompiler<'a> {
    schema: &'a SchemaConfig,
}

impl<'a> CriteriaCompiler<'a> {
    pub fn new(schema: &'a SchemaConfig) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaConfig {
        self.schema
    }

    /// Compile the eligibility predicate with a fresh parameter namespace.
    pub fn compile(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        let predicate = self.predicate(request)?;
        Ok(predicate.render(&mut ParameterNamespace::new()))
    }

    pub(crate) fn predicate(&self, request: &SearchRequest) -> Result<Sql> {
        if request.is_empty() {
            tracing::warn!("Rejected search request without includes or excludes");
            return Err(Error::InvalidCriteria(
                "Invalid SearchRequest: includes[] and excludes[] cannot both be empty"
                    .to_string(),
            ));
        }

        let mut clauses = Vec::with_capacity(request.includes.len() + request.excludes.len());
        for group in &request.includes {
            clauses.push(self.group_sql(group)?.wrap("person.person_id in (", ")\n"));
        }
        for group in &request.excludes {
            let body = self.group_sql(group)?;
            // Without includes there is nothing to subtract from; the group
            // is kept as a plain membership clause.
            if request.includes.is_empty() {
                clauses.push(body.wrap("person.person_id in (", ")\n"));
            } else {
                clauses.push(body.wrap(
                    "not exists\n(select 'x' from\n(",
                    ")\nx where x.person_id = person.person_id)\n",
                ));
            }
        }

        tracing::debug!(
            includes = request.includes.len(),
            excludes = request.excludes.len(),
            "Compiled criteria tree"
        );
        Ok(Sql::join(clauses, "and "))
    }

    fn group_sql(&self, group: &SearchGroup) -> Result<Sql> {
        if group.items.is_empty() {
            return Err(Error::InvalidCriteria(
                "search group contains no items".to_string(),
            ));
        }
        if group.temporal {
            return temporal::group_sql(self, group);
        }
        let items = group
            .items
            .iter()
            .map(|item| self.item_sql(item, Output::Participants))
            .collect::<Result<Vec<_>>>()?;
        Ok(Sql::join(items, "union all\n"))
    }

    pub(crate) fn item_sql(&self, item: &SearchGroupItem, output: Output) -> Result<Sql> {
        let modifiers = ItemModifiers::from_item(&item.modifiers)?;
        let type_name = item.criteria.type_name();

        let domain_queries = match &item.criteria {
            ItemCriteria::Icd9(codes) => {
                codes::domain_bodies(CodeVocabulary::Icd9, codes, self.schema)?
            }
            ItemCriteria::Icd10(codes) => {
                codes::domain_bodies(CodeVocabulary::Icd10, codes, self.schema)?
            }
            ItemCriteria::Cpt(codes) => {
                codes::domain_bodies(CodeVocabulary::Cpt, codes, self.schema)?
            }
            ItemCriteria::Concept(concepts) => concepts::domain_bodies(concepts, self.schema)?,
            ItemCriteria::Demographic(demo) => {
                if output == Output::Events {
                    return Err(Error::InvalidCriteria(
                        "demographic criteria cannot be used in a temporal group".to_string(),
                    ));
                }
                if !modifiers.is_empty() {
                    return Err(Error::InvalidCriteria(
                        "demographic criteria do not support modifiers".to_string(),
                    ));
                }
                tracing::debug!(item_type = type_name, "Compiled search item");
                return demographics::item_sql(demo, self.schema);
            }
        };

        if domain_queries.is_empty() {
            return Err(Error::InvalidCriteria(format!(
                "{} search item has no search parameters",
                type_name
            )));
        }

        let queries = domain_queries
            .into_iter()
            .map(|body| self.domain_query(body, &modifiers, output))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            item_type = type_name,
            domains = queries.len(),
            output = ?output,
            "Compiled search item"
        );

        let union = Sql::join(queries, "union all\n");
        Ok(match output {
            Output::Participants => union.wrap(
                &format!(
                    "select person_id\nfrom {} p\nwhere person_id in (",
                    table(&self.schema.table(Domain::Person)?.table)
                ),
                ")\n",
            ),
            Output::Events => union,
        })
    }

    /// Add the select list and modifier filters to a domain body.
    fn domain_query(
        &self,
        body: DomainBody,
        modifiers: &ItemModifiers<'_>,
        output: Output,
    ) -> Result<Sql> {
        let mut filtered = body.from_where;
        modifiers.push_filters(&mut filtered, self.schema, body.domain)?;

        let counted = |filtered: Sql| -> Result<Sql> {
            let mut select = Sql::text(format!(
                "select person_id, a.{} as concept_id\n",
                body.concept_column
            ));
            select.append(filtered);
            modifiers.wrap_occurrences(select)
        };

        match output {
            Output::Participants if modifiers.counts_occurrences() => counted(filtered),
            Output::Participants => {
                let mut select = Sql::text("select distinct person_id\n");
                select.append(filtered);
                Ok(select)
            }
            Output::Events => {
                let date = self.schema.entry_date_column(body.domain)?;
                let mut select = Sql::text(format!(
                    "select a.person_id, a.visit_occurrence_id, a.{} as entry_date\n",
                    date
                ));
                select.append(filtered.clone());
                if modifiers.counts_occurrences() {
                    select.append(counted(filtered)?.wrap("and a.person_id in (", ")\n"));
                }
                Ok(select)
            }
        }
    }
}

/// Everything after the select list of one domain's query: `from ... where ...`,
/// each line newline-terminated.
#[derive(Debug)]
pub(crate) struct DomainBody {
    domain: Domain,
    from_where: Sql,
    /// Column grouped on when counting occurrences
    concept_column: String,
}

/// Group items by domain, keeping first-seen order.
fn bucket_by_domain<T>(items: &[T], domain: impl Fn(&T) -> Domain) -> Vec<(Domain, Vec<&T>)> {
    let mut buckets: Vec<(Domain, Vec<&T>)> = Vec::new();
    for item in items {
        let d = domain(item);
        match buckets.iter_mut().find(|(existing, _)| *existing == d) {
            Some((_, members)) => members.push(item),
            None => buckets.push((d, vec![item])),
        }
    }
    buckets
}

/// Compile `request` against `schema`.
pub fn compile(request: &SearchRequest, schema: &SchemaConfig) -> Result<CompiledQuery> {
    CriteriaCompiler::new(schema).compile(request)
}
