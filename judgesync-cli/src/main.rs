//! judgesync: keeps a judge database in line with problem directories.
//!
//! # Usage
//!
//! ```bash
//! # Create the database schema
//! judgesync init --db judge.sqlite
//!
//! # Create a contest and add problems to it
//! judgesync contest --db judge.sqlite --name final --start 2024-05-01T10:00:00Z --problem sum=A
//!
//! # Reconcile test cases and jury submissions of a problem
//! judgesync sync --db judge.sqlite problems/sum
//!
//! # Show what sync would change, without writing
//! judgesync plan --db judge.sqlite problems/sum
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use judgesync_core::{ProblemDescription, ReconcileConfig, Reconciler, SqliteStore, Store};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "judgesync")]
#[command(author = "JudgeSync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Synchronize problem directories into a judge database")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init {
        /// Database path
        #[arg(long)]
        db: PathBuf,
    },

    /// Create or update a contest and link problems to it
    Contest {
        /// Database path
        #[arg(long)]
        db: PathBuf,
        /// Contest short name
        #[arg(short, long)]
        name: String,
        /// Start time (RFC 3339)
        #[arg(short, long)]
        start: String,
        /// Problem to include, as EXTERNAL_ID=SHORTNAME
        #[arg(short, long = "problem")]
        problems: Vec<String>,
    },

    /// Reconcile test cases and jury submissions of a problem
    Sync {
        /// Database path
        #[arg(long)]
        db: PathBuf,
        /// Problem directory or manifest
        problem: PathBuf,
        /// Contests to sync submissions into (default: all contests with the problem)
        #[arg(short, long = "contest")]
        contests: Vec<String>,
        /// Reconciler configuration (default: judgesync.json next to the database)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only reconcile test cases
        #[arg(long)]
        skip_submissions: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the planned changes without writing anything
    Plan {
        /// Database path
        #[arg(long)]
        db: PathBuf,
        /// Problem directory or manifest
        problem: PathBuf,
        /// Contests to plan submissions for
        #[arg(short, long = "contest")]
        contests: Vec<String>,
        /// Reconciler configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("judgesync={}", level).parse()?)
                .add_directive(format!("judgesync_core={}", level).parse()?),
        )
        .init();

    match cli.command {
        Commands::Init { db } => cmd_init(&db),

        Commands::Contest {
            db,
            name,
            start,
            problems,
        } => cmd_contest(&db, &name, &start, &problems),

        Commands::Sync {
            db,
            problem,
            contests,
            config,
            skip_submissions,
            json,
        } => cmd_sync(&db, &problem, &contests, config.as_deref(), skip_submissions, json),

        Commands::Plan {
            db,
            problem,
            contests,
            config,
        } => cmd_plan(&db, &problem, &contests, config.as_deref()),
    }
}

fn open_store(db: &Path) -> Result<SqliteStore> {
    tracing::debug!("Opening database {:?}", db);
    SqliteStore::open(db).with_context(|| format!("Failed to open database {:?}", db))
}

fn load_config(db: &Path, config: Option<&Path>) -> Result<ReconcileConfig> {
    let path = match config {
        Some(path) => path.to_path_buf(),
        None => db.with_file_name("judgesync.json"),
    };
    ReconcileConfig::load(&path)
}

/// Split `EXTERNAL_ID=SHORTNAME`; the short name defaults to the id.
fn parse_problem_link(link: &str) -> (&str, &str) {
    match link.split_once('=') {
        Some((external_id, shortname)) => (external_id, shortname),
        None => (link, link),
    }
}

fn resolve_contests(store: &SqliteStore, names: &[String]) -> Result<Option<Vec<i64>>> {
    if names.is_empty() {
        return Ok(None);
    }
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = store
            .contest_id(name)?
            .ok_or_else(|| anyhow!("Contest {} does not exist", name))?;
        ids.push(id);
    }
    Ok(Some(ids))
}

fn cmd_init(db: &Path) -> Result<()> {
    open_store(db)?;
    println!("Initialized database at {}", db.display());
    Ok(())
}

fn cmd_contest(db: &Path, name: &str, start: &str, problems: &[String]) -> Result<()> {
    let start: DateTime<Utc> = DateTime::parse_from_rfc3339(start)
        .with_context(|| format!("Invalid start time {}", start))?
        .with_timezone(&Utc);
    let store = open_store(db)?;
    let contest_id = store.ensure_contest(name, start)?;
    tracing::info!("Contest {} has id {}", name, contest_id);
    println!("Contest {} (id {}) starts at {}", name, contest_id, start);

    for link in problems {
        let (external_id, shortname) = parse_problem_link(link);
        let problem_id = store
            .problem_id(external_id)?
            .ok_or_else(|| anyhow!("Problem {} does not exist, sync it first", external_id))?;
        store.link_contest_problem(contest_id, problem_id, shortname)?;
        println!("  {} as {}", external_id, shortname);
    }
    Ok(())
}

fn cmd_sync(
    db: &Path,
    problem: &Path,
    contests: &[String],
    config: Option<&Path>,
    skip_submissions: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(db, config)?;
    let description = ProblemDescription::load(problem)?;
    let mut store = open_store(db)?;

    let problem_id = store.ensure_problem(&description.problem, description.display_name())?;
    tracing::info!("Syncing problem {} (id {})", description.problem, problem_id);
    let contest_ids = resolve_contests(&store, contests)?;
    let mut teams = HashMap::new();
    for team in description.team_names() {
        teams.insert(team.to_string(), store.ensure_team(team)?);
    }

    let test_cases = description.test_cases(&config)?;
    let submissions = description.submissions(&teams)?;
    let reconciler = Reconciler::new(config);

    tracing::debug!("Loaded {} test cases and {} submissions", test_cases.len(), submissions.len());
    let case_summary = reconciler.reconcile_test_cases(&mut store, problem_id, &test_cases)?;
    let submission_summary = if skip_submissions {
        tracing::info!("Skipping submissions");
        None
    } else {
        Some(reconciler.reconcile_submissions(&mut store, problem_id, contest_ids.as_deref(), &submissions)?)
    };

    if json {
        let report = serde_json::json!({
            "problem": description.problem,
            "test_cases": case_summary,
            "submissions": submission_summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Problem {} ({}):", description.display_name(), description.problem);
    println!("  Test cases:  {}", case_summary);
    if let Some(summary) = &submission_summary {
        println!("  Submissions: {}", summary);
    }
    for warning in case_summary
        .warnings
        .iter()
        .chain(submission_summary.iter().flat_map(|s| s.warnings.iter()))
    {
        println!("  warning: {}", warning);
    }
    Ok(())
}

fn cmd_plan(db: &Path, problem: &Path, contests: &[String], config: Option<&Path>) -> Result<()> {
    let config = load_config(db, config)?;
    let description = ProblemDescription::load(problem)?;
    let mut store = open_store(db)?;

    let problem_id = store
        .problem_id(&description.problem)?
        .ok_or_else(|| anyhow!("Problem {} is not in the database, nothing to compare", description.problem))?;
    let contest_ids = resolve_contests(&store, contests)?;
    let mut teams = HashMap::new();
    for team in description.team_names() {
        match store.team_id(team)? {
            Some(id) => teams.insert(team.to_string(), id),
            None => bail!("Team {} is not in the database", team),
        };
    }

    let test_cases = description.test_cases(&config)?;
    let submissions = description.submissions(&teams)?;
    let reconciler = Reconciler::new(config);

    tracing::info!("Planning problem {} (id {}) without writing", description.problem, problem_id);
    let tx = store.begin()?;
    let case_plan = reconciler.plan_test_cases(&*tx, problem_id, &test_cases)?;
    print!("{}", case_plan);
    let submission_plan = reconciler.plan_submissions(&*tx, problem_id, contest_ids.as_deref(), &submissions)?;
    print!("{}", submission_plan);
    if case_plan.is_noop() && submission_plan.is_noop() {
        println!("Already up to date.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_problem_link() {
        assert_eq!(parse_problem_link("sum=A"), ("sum", "A"));
        assert_eq!(parse_problem_link("sum"), ("sum", "sum"));
    }

    #[test]
    fn test_cli_parses_sync() {
        let cli = Cli::try_parse_from([
            "judgesync", "sync", "--db", "judge.sqlite", "problems/sum", "-c", "final", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync { contests, json, .. } => {
                assert_eq!(contests, vec!["final"]);
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_contest_requires_known_problem() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("judge.sqlite");
        cmd_init(&db).unwrap();
        cmd_contest(&db, "final", "2024-05-01T10:00:00Z", &[]).unwrap();
        assert!(cmd_contest(&db, "final", "2024-05-01T10:00:00Z", &["sum=A".to_string()]).is_err());
        assert!(cmd_contest(&db, "final", "yesterday", &[]).is_err());
    }

    #[test]
    fn test_config_defaults_next_to_database() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("judge.sqlite"), None).unwrap();
        assert_eq!(config, ReconcileConfig::default());
    }
}
