//! cohortql - compile cohort criteria and dataset requests into warehouse SQL
//!
//! Every query subcommand prints `{ "sql": ..., "parameters": {...} }` on stdout;
//! logs go to stderr.

mod commands;
mod config;
mod logging;
mod warehouse;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cohortql_model::Domain;
use commands::ParticipantQuery;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cohortql", version, about = "Compile cohort criteria into warehouse SQL")]
struct Cli {
    /// Configuration file (defaults to ./cohortql.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize a criteria search term
    Normalize { term: String },

    /// Participant count query
    Count { criteria: PathBuf },

    /// Paged participant id query
    Ids {
        criteria: PathBuf,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },

    /// Gender, race and age-band chart query
    Chart { criteria: PathBuf },

    /// Top concepts of one domain among the cohort
    DomainChart {
        criteria: PathBuf,
        #[arg(long)]
        domain: Domain,
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Criteria catalog search query
    Search {
        #[arg(long)]
        domain: Domain,
        #[arg(long)]
        term: String,
        /// Search source rather than standard concepts
        #[arg(long)]
        source: bool,
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Per-domain dataset export queries
    Dataset {
        request: PathBuf,
        /// JSON array of ds_linking rows
        #[arg(long)]
        linking: PathBuf,
        /// JSON array of survey question concept ids
        #[arg(long)]
        survey_concepts: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config =
        config::Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let _logging_guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting cohortql");

    let schema = config.schema()?;
    let output = match cli.command {
        Command::Normalize { term } => {
            println!("{}", commands::normalize_term(&config, &term));
            return Ok(());
        }
        Command::Count { criteria } => {
            commands::participant(&config, &schema, &criteria, ParticipantQuery::Count)?
        }
        Command::Ids {
            criteria,
            limit,
            offset,
        } => commands::participant(
            &config,
            &schema,
            &criteria,
            ParticipantQuery::Ids { limit, offset },
        )?,
        Command::Chart { criteria } => {
            commands::participant(&config, &schema, &criteria, ParticipantQuery::Chart)?
        }
        Command::DomainChart {
            criteria,
            domain,
            limit,
        } => commands::participant(
            &config,
            &schema,
            &criteria,
            ParticipantQuery::DomainChart { domain, limit },
        )?,
        Command::Search {
            domain,
            term,
            source,
            limit,
        } => commands::search(&config, domain, &term, source, limit)?,
        Command::Dataset {
            request,
            linking,
            survey_concepts,
        } => {
            commands::dataset(
                &config,
                schema,
                &request,
                &linking,
                survey_concepts.as_deref(),
            )
            .await?
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to render output")?
    );
    Ok(())
}
