mod error;
mod google;
mod pipeline;
mod report;
mod settings;
mod web;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use google::GoogleClient;
use pipeline::{Journal, Level};
use report::{ExtractionResult, HeaderMode};
use settings::Settings;

#[derive(Parser)]
#[command(name = "report_loader", about = "Medical HTML report → Google Sheets → PDF on Drive")]
struct Cli {
    /// Settings file (TOML); REPORT_* environment variables override it
    #[arg(short, long, global = true, default_value = settings::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the upload form
    Serve {
        /// Listen address (default: `bind` from settings)
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Run the whole pipeline for one report file
    Process {
        file: PathBuf,
    },
    /// Only extract and print the report table; nothing is sent anywhere
    Extract {
        file: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Drop the first row of every table instead of only the first overall
        #[arg(long)]
        per_table: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    let mut opts = settings.extract_options()?;

    match cli.command {
        Commands::Serve { addr } => {
            let remote = GoogleClient::connect(&settings)?;
            let addr = addr.unwrap_or_else(|| settings.bind.clone());
            let state = web::AppState::new(settings, opts, remote);
            web::serve(&addr, state).await?;
        }
        Commands::Process { file } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut remote = GoogleClient::connect(&settings)?;

            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(120));
            let bar = pb.clone();
            let mut journal = Journal::with_observer(move |step| {
                let mark = match step.level {
                    Level::Info => " ",
                    Level::Success => "✓",
                    Level::Error => "✗",
                };
                bar.println(format!("{} {}", mark, step.message));
                bar.set_message(step.message.clone());
            });

            let result = pipeline::run(&settings, &opts, &raw, &mut remote, &mut journal).await;
            pb.finish_and_clear();
            let outcome = result?;
            println!(
                "{} rows → sheet gid {}, PDF {} uploaded as {}",
                outcome.rows,
                outcome.sheet_gid,
                outcome.pdf_path.display(),
                outcome.file_id
            );
        }
        Commands::Extract { file, json, per_table } => {
            if per_table {
                opts.header_mode = HeaderMode::PerTable;
            }
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let extracted = report::transform(&raw, &opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&extracted)?);
            } else {
                print_table(&extracted);
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn print_table(r: &ExtractionResult) {
    let c = &r.client;
    println!("Client:  {}", c.full_name);
    println!("Age:     {}", c.age);
    println!("Build:   {}", c.body_type);
    println!("Tested:  {}", c.test_time);
    println!();

    println!(
        "{:>3} | {:<36} | {:<16} | {:<10} | {}",
        "#", report::COLUMNS[0], "Норма", report::COLUMNS[2], report::COLUMNS[3]
    );
    println!("{}", "-".repeat(100));
    for (i, row) in r.rows.iter().enumerate() {
        println!(
            "{:>3} | {:<36} | {:<16} | {:<10} | {}",
            i + 1,
            truncate(&row.parameter, 36),
            truncate(&row.normal_range, 16),
            truncate(&row.result, 10),
            row.interpretation
        );
    }
    println!("\n{} rows", r.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
