//! Participant-level queries over the compiled eligibility predicate.

use crate::compiler::CriteriaCompiler;
use crate::error::Result;
use crate::fragment::{table, Sql};
use crate::params::{CompiledQuery, ParameterNamespace};
use crate::schema::SchemaConfig;
use cohortql_model::{Domain, SearchRequest};

const AGE: &str = "CAST(DATE_DIFF(CURRENT_DATE, DATE(person.year_of_birth, person.month_of_birth, person.day_of_birth), MONTH)/12 as INT64)";

/// Age bands of the demographic chart, inclusive on both ends.
const AGE_BANDS: [(u32, u32); 3] = [(0, 18), (19, 44), (45, 64)];

pub struct ParticipantQueryBuilder<'a> {
    compiler: CriteriaCompiler<'a>,
}

impl<'a> ParticipantQueryBuilder<'a> {
    pub fn new(schema: &'a SchemaConfig) -> Self {
        Self {
            compiler: CriteriaCompiler::new(schema),
        }
    }

    /// `select count(distinct person_id) ...` over the eligible participants.
    pub fn count_query(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        self.assemble(
            "select count(distinct person_id) as count\n".to_string(),
            request,
            "",
        )
    }

    /// One page of eligible participants with their demographic columns.
    pub fn id_query(
        &self,
        request: &SearchRequest,
        limit: u64,
        offset: u64,
    ) -> Result<CompiledQuery> {
        let mut tail = format!("order by person_id\nlimit {}", limit);
        if offset > 0 {
            tail.push_str(&format!(" offset {}", offset));
        }
        self.assemble(
            "select distinct person_id, race_concept_id, gender_concept_id, ethnicity_concept_id, birth_datetime\n"
                .to_string(),
            request,
            &tail,
        )
    }

    /// Counts grouped by gender, race and age band.
    pub fn chart_query(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        let concept = table("concept");
        let mut select = String::from("select concept1.concept_code as gender, \n");
        select.push_str(
            "case when concept2.concept_name is null then 'Unknown' else concept2.concept_name end as race, \n",
        );
        for (i, (low, high)) in AGE_BANDS.iter().enumerate() {
            select.push_str(if i == 0 { "case when " } else { "when " });
            select.push_str(&format!(
                "{age} >= {low} and {age} <= {high} then '{low}-{high}'\n",
                age = AGE,
                low = low,
                high = high
            ));
        }
        select.push_str("else '> 65'\nend as ageRange,\ncount(*) as count\n");

        let joins = format!(
            "left join {c} concept1 on (person.gender_concept_id = concept1.concept_id and concept1.vocabulary_id = 'Gender')\n\
             left join {c} concept2 on (person.race_concept_id = concept2.concept_id and concept2.vocabulary_id = 'Race')\n",
            c = concept
        );

        let predicate = self.compiler.predicate(request)?;
        let mut sql = Sql::text(select);
        sql.push_str(&format!("from {} person\n", self.person_table()?))
            .push_str(&joins)
            .push_str("where\n")
            .append(predicate)
            .push_str("group by gender, race, ageRange\norder by gender, race, ageRange\n");
        Ok(sql.render(&mut ParameterNamespace::new()))
    }

    /// Most frequent standard concepts of `domain` among eligible participants.
    pub fn domain_chart_query(
        &self,
        request: &SearchRequest,
        domain: Domain,
        limit: u64,
    ) -> Result<CompiledQuery> {
        let schema = self.compiler.schema();
        let occurrence = table(&schema.table(domain)?.table);
        let (standard, _) = schema.concept_columns(domain)?;

        let mut sql = Sql::text(format!(
            "select c.concept_name as name, a.{std} as conceptId, count(distinct a.person_id) as count\n\
             from {occurrence} a\n\
             join {concept} c on (a.{std} = c.concept_id)\n\
             where a.person_id in (",
            std = standard,
            occurrence = occurrence,
            concept = table("concept"),
        ));
        sql.append(self.person_id_sql(request)?);
        sql.push_str(&format!(
            ")\nand a.{} != 0\ngroup by name, conceptId\norder by count desc, name asc\nlimit {}",
            standard, limit
        ));

        tracing::debug!(domain = %domain, limit, "Assembled domain chart query");
        Ok(sql.render(&mut ParameterNamespace::new()))
    }

    /// `select person_id ...` for use as a subquery, e.g. a dataset cohort filter.
    pub fn person_id_query(&self, request: &SearchRequest) -> Result<CompiledQuery> {
        Ok(self
            .person_id_sql(request)?
            .render(&mut ParameterNamespace::new()))
    }

    fn person_id_sql(&self, request: &SearchRequest) -> Result<Sql> {
        let predicate = self.compiler.predicate(request)?;
        let mut sql = Sql::text(format!(
            "select person_id\nfrom {} person\nwhere\n",
            self.person_table()?
        ));
        sql.append(predicate);
        Ok(sql)
    }

    fn assemble(&self, select: String, request: &SearchRequest, tail: &str) -> Result<CompiledQuery> {
        let predicate = self.compiler.predicate(request)?;
        let mut sql = Sql::text(select);
        sql.push_str(&format!("from {} person\nwhere\n", self.person_table()?))
            .append(predicate)
            .push_str(tail);
        Ok(sql.render(&mut ParameterNamespace::new()))
    }

    fn person_table(&self) -> Result<String> {
        Ok(table(&self.compiler.schema().table(Domain::Person)?.table))
    }
}
