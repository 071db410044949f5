use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

mod access;
mod cache;
mod config;
mod context;
mod db;
mod entry;
mod error;
#[cfg(test)]
mod fixtures;
mod grades;
mod models;
mod normalize;
mod report;
mod repo;
mod service;
mod sheet;

use crate::config::Settings;
use crate::db::PgGradeStore;
use crate::entry::EntryRequest;
use crate::models::{Category, EntryWindow};
use crate::repo::{GradeRepository, SnapshotStore};
use crate::service::{Gradebook, LookupQuery};

#[derive(Parser)]
#[command(name = "gradebook")]
#[command(about = "Report card lookup and grade entry", long_about = None)]
struct Cli {
    /// Work from a CSV export of the grade sheet instead of Postgres; entries
    /// are written back to it
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,
    /// Entry windows CSV used together with --snapshot
    #[arg(long, global = true)]
    windows: Option<PathBuf>,
    /// Date to check entry windows against (defaults to today)
    #[arg(long, global = true, value_parser = parse_date_arg)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample grades and entry windows
    Seed,
    /// Import grades from a CSV export of the grade sheet
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List grade levels, students, periods, or a teacher's classes
    Options {
        #[arg(long)]
        grade_level: Option<String>,
        #[arg(long, requires = "grade_level")]
        student: Option<String>,
        #[arg(long, conflicts_with_all = ["grade_level", "student"])]
        teacher_id: Option<String>,
    },
    /// Show a student's report card for one period
    Lookup {
        #[arg(long)]
        grade_level: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        period: String,
        /// Write the report to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the raw grade rows as CSV into this directory
        #[arg(long)]
        export_dir: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Enter or amend scores for a class
    Enter {
        #[arg(long)]
        teacher_name: String,
        #[arg(long)]
        teacher_id: String,
        #[arg(long)]
        grade_level: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        category: Category,
        /// STUDENT_ID=SCORE, repeatable
        #[arg(long = "score", value_parser = parse_score_arg)]
        scores: Vec<(String, f64)>,
        /// Replace scores that already exist
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Open the entry window for a period
    OpenWindow {
        #[arg(long)]
        period: String,
        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_date_arg)]
        to: NaiveDate,
    },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    sheet::parse_window_date(value).map_err(|err| err.to_string())
}

fn parse_score_arg(value: &str) -> Result<(String, f64), String> {
    let (student_id, score) = value
        .split_once('=')
        .ok_or_else(|| format!("expected STUDENT_ID=SCORE, got {value:?}"))?;
    if student_id.trim().is_empty() {
        return Err(format!("missing student ID in {value:?}"));
    }
    Ok((
        student_id.trim().to_string(),
        normalize::normalize_score(Some(score)),
    ))
}

enum Backend {
    Postgres(PgGradeStore),
    Snapshot(Arc<SnapshotStore>),
}

impl Backend {
    fn repository(&self) -> Arc<dyn GradeRepository> {
        match self {
            Backend::Postgres(store) => Arc::new(store.clone()),
            Backend::Snapshot(store) => store.clone(),
        }
    }

    fn postgres(&self) -> anyhow::Result<&PgGradeStore> {
        match self {
            Backend::Postgres(store) => Ok(store),
            Backend::Snapshot(_) => anyhow::bail!("this command needs Postgres; drop --snapshot"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing();
    run(Cli::parse()).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    let backend = match &cli.snapshot {
        Some(path) => Backend::Snapshot(Arc::new(SnapshotStore::from_csv(
            path,
            cli.windows.as_deref(),
        )?)),
        None => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(settings.require_database_url()?)
                .await
                .context("failed to connect to Postgres")?;
            Backend::Postgres(PgGradeStore::new(pool))
        }
    };
    let gradebook = Gradebook::new(backend.repository());
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Commands::InitDb => {
            db::init_db(backend.postgres()?.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(backend.postgres()?.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(backend.postgres()?.pool(), &csv).await?;
            println!("Inserted {inserted} grades from {}.", csv.display());
        }
        Commands::Options {
            grade_level,
            student,
            teacher_id,
        } => {
            if let Some(teacher_id) = teacher_id {
                let assignments = gradebook.teacher_assignments(&teacher_id).await?;
                if assignments.is_empty() {
                    println!("No grade levels are associated with this teacher ID.");
                }
                for (level, subjects) in assignments {
                    println!("- {level}: {}", subjects.join(", "));
                }
            } else if let (Some(grade_level), Some(student)) = (&grade_level, &student) {
                println!("Periods:");
                for period in gradebook.periods(grade_level, student).await? {
                    println!("- {period}");
                }
            } else if let Some(grade_level) = &grade_level {
                println!("Students:");
                for student in gradebook.students(grade_level).await? {
                    println!("- {}", student.student_name);
                }
            } else {
                println!("Grade levels:");
                for level in gradebook.grade_levels().await? {
                    println!("- {level}");
                }
            }
        }
        Commands::Lookup {
            grade_level,
            student,
            student_id,
            period,
            out,
            export_dir,
            json,
        } => {
            let query = LookupQuery {
                grade_level,
                student_name: student,
                student_id,
                period,
            };
            let lookup = gradebook
                .report_card(&query, today)
                .await
                .inspect_err(|err| error!(error = %err, "Lookup failed"))?;

            let rendered = if json {
                serde_json::to_string_pretty(&lookup.card)?
            } else {
                report::build_report(&lookup.card)
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }

            if let Some(dir) = export_dir {
                let path = dir.join(report::export_file_name(
                    &lookup.card.student_name,
                    &lookup.card.period,
                ));
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_csv_export(&lookup.records, file)?;
                println!("Report card exported to {}.", path.display());
            }
        }
        Commands::Enter {
            teacher_name,
            teacher_id,
            grade_level,
            subject,
            period,
            category,
            scores,
            overwrite,
        } => {
            let request = EntryRequest {
                grade_level,
                subject,
                period,
                category,
                scores,
                overwrite,
            };
            let outcome = gradebook
                .submit_entry(&teacher_name, &teacher_id, &request, today)
                .await
                .inspect_err(|err| error!(error = %err, "Grade entry failed"))?;

            for line in outcome.plan.updated.iter().chain(&outcome.plan.appended) {
                println!("{line}");
            }
            for line in &outcome.plan.rejected {
                println!("{line}");
            }
            if !outcome.written.changed() {
                println!("No scores were changed or added.");
            } else {
                if let Backend::Snapshot(store) = &backend {
                    if let Some(path) = &cli.snapshot {
                        store.save_csv(path, cli.windows.as_deref()).await?;
                    }
                }
                println!("Scores saved.");
            }
        }
        Commands::OpenWindow { period, from, to } => {
            if from > to {
                anyhow::bail!("window opens after it closes: {from} > {to}");
            }
            let window = EntryWindow {
                period: normalize::normalize_label(&period),
                opens_on: from,
                closes_on: to,
            };
            backend.repository().set_entry_window(&window).await?;
            if let Backend::Snapshot(store) = &backend {
                let windows = cli
                    .windows
                    .as_deref()
                    .context("--windows is required to save an entry window with --snapshot")?;
                if let Some(path) = &cli.snapshot {
                    store.save_csv(path, Some(windows)).await?;
                }
            }
            info!(period = %window.period, "Entry window saved");
            println!(
                "Entry for {} open from {} to {}.",
                window.period,
                sheet::format_date(from),
                sheet::format_date(to)
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GradebookError;
    use std::io::Write;

    fn sheet_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Nome do Aluno,Matrícula,Série,Turno,Bimestre,Componente Curricular,Tipo de Avaliação,Nota,Professor,Mat_Professor"
        )
        .unwrap();
        writeln!(file, "Ana Souza,2025001,6º ano,Manhã,1º,Matemática,Mensal,7,Carla,P100").unwrap();
        file.flush().unwrap();
        file
    }

    fn cli(sheet: &tempfile::NamedTempFile, args: &[&str]) -> Cli {
        let path = sheet.path().to_str().unwrap();
        let mut argv = vec!["gradebook", "--snapshot", path];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn workflow_errors_are_returned_from_run() {
        let sheet = sheet_file();
        let lookup = cli(
            &sheet,
            &[
                "lookup",
                "--grade-level",
                "6º ano",
                "--student",
                "Ana Souza",
                "--student-id",
                "9999",
                "--period",
                "1º",
            ],
        );
        let err = run(lookup).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GradebookError>(),
            Some(GradebookError::Unauthorized(_))
        ));

        let enter = cli(
            &sheet,
            &[
                "enter",
                "--teacher-name",
                "Carla",
                "--teacher-id",
                "P100",
                "--grade-level",
                "6º ano",
                "--subject",
                "Matemática",
                "--period",
                "1º",
                "--category",
                "bimestral",
                "--score",
                "2025001=5",
                "--score",
                "2025001=9",
            ],
        );
        let err = run(enter).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<GradebookError>(),
            Some(&GradebookError::DuplicateScore("2025001".to_string()))
        );
        let text = std::fs::read_to_string(sheet.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn score_args_accept_comma_decimals() {
        assert_eq!(
            parse_score_arg("2025001=8,5"),
            Ok(("2025001".to_string(), 8.5))
        );
        assert!(parse_score_arg("8.5").is_err());
        assert!(parse_score_arg("=8.5").is_err());
    }

    #[test]
    fn cli_parses_entry_command() {
        let cli = Cli::try_parse_from([
            "gradebook",
            "--snapshot",
            "grades.csv",
            "enter",
            "--teacher-name",
            "Carla",
            "--teacher-id",
            "P100",
            "--grade-level",
            "6º ano",
            "--subject",
            "math",
            "--period",
            "1º",
            "--category",
            "mensal",
            "--score",
            "2025001=9",
            "--score",
            "2025002=7,5",
            "--overwrite",
        ])
        .unwrap();

        match cli.command {
            Commands::Enter {
                category,
                scores,
                overwrite,
                ..
            } => {
                assert_eq!(category, Category::Monthly);
                assert_eq!(scores.len(), 2);
                assert_eq!(scores[1].1, 7.5);
                assert!(overwrite);
            }
            _ => panic!("expected enter command"),
        }
    }
}
