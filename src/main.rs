use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod analysis;
mod confidence;
mod config;
mod db;
mod forecast;
mod ingest;
mod models;
mod regression;
mod report;
mod trend;
mod warnings;

use analysis::{Analyzer, StudentFlag};
use config::EngineConfig;
use ingest::MissingScorePolicy;

#[derive(Parser)]
#[command(name = "grade-trend-warning")]
#[command(about = "Grade trend analysis and early warning for student records", long_about = None)]
struct Cli {
    /// JSON file overriding the default analysis thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// How to treat grades whose score is blank or not a number
    #[arg(long, global = true, value_enum, default_value_t = MissingScorePolicy::Reject)]
    missing_scores: MissingScorePolicy,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import grade rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Analyze every subject of one student
    Analyze {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Bucket a class by the most severe warning per student
    Warnings {
        #[arg(long)]
        class: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report for a class
    Report {
        #[arg(long)]
        class: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_bucket(title: &str, flags: &[StudentFlag], limit: usize) {
    println!("{} ({}):", title, flags.len());
    for flag in flags.iter().take(limit) {
        println!(
            "- {} ({}) {} warning(s) in {}: {}",
            flag.student.full_name,
            flag.student.email,
            flag.warning_count,
            flag.subjects.join(", "),
            flag.headline
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine_config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let policy = cli.missing_scores;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let analyzer = Analyzer::new(&engine_config);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv, policy).await?;
            println!("Inserted {inserted} grades from {}.", csv.display());
        }
        Commands::Analyze {
            email,
            subject,
            json,
        } => {
            let student = db::fetch_student_by_email(&pool, &email)
                .await?
                .with_context(|| format!("no student with email {email}"))?;
            let raw = db::fetch_grades(&pool, &[student.id], subject.as_deref()).await?;
            let (rows, rejected) = ingest::partition_rows(&raw, policy);
            info!(student = %student.email, grades = rows.len(), skipped = rejected.len(), "analyzing student");

            let analysis = analyzer.analyze_student(&student, &rows);
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print!("{}", report::render_student(&analysis));
            }
        }
        Commands::Warnings { class, limit, json } => {
            let roster = db::fetch_class_roster(&pool, &class).await?;
            if roster.is_empty() {
                println!("No students enrolled in class {class}.");
                return Ok(());
            }
            let ids: Vec<_> = roster.iter().map(|student| student.id).collect();
            let raw = db::fetch_grades(&pool, &ids, None).await?;
            let (rows, rejected) = ingest::partition_rows(&raw, policy);
            info!(class = %class, students = roster.len(), grades = rows.len(), skipped = rejected.len(), "scanning class");

            let summary = analyzer.class_warnings(&roster, &rows);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!(
                "Class {}: {} of {} students flagged.",
                class, summary.students_with_warnings, summary.total_students
            );
            print_bucket("Critical", &summary.critical, limit);
            print_bucket("High", &summary.high, limit);
            print_bucket("Watch", &summary.medium, limit);
        }
        Commands::Report { class, out } => {
            let roster = db::fetch_class_roster(&pool, &class).await?;
            let ids: Vec<_> = roster.iter().map(|student| student.id).collect();
            let raw = db::fetch_grades(&pool, &ids, None).await?;
            let (rows, rejected) = ingest::partition_rows(&raw, policy);
            if !rejected.is_empty() {
                warn!(class = %class, skipped = rejected.len(), "report leaves out unusable grades");
            }

            let analyses = analyzer.analyze_roster(&roster, &rows);
            let summary = analysis::summarize_class(&analyses);
            let report = report::build_report(&class, &summary, &analyses);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
