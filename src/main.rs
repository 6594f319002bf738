use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::error;

use wiki_extract::config::{Config, DEFAULT_CONFIG_PATH};
use wiki_extract::export::to_pretty_json;
use wiki_extract::extract::{self, Family};
use wiki_extract::fetch::WikiClient;
use wiki_extract::{extract_page, parse_tables};

#[derive(Parser)]
#[command(name = "wiki_extract", about = "Structured JSON extraction from MediaWiki pages")]
struct Cli {
    /// Path to config.json
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and extract one page family
    Extract {
        #[arg(value_enum)]
        family: Family,
    },
    /// Extract every page family
    All,
    /// Parse a local wikitext file and print the JSON tree
    Parse {
        file: PathBuf,
        /// Section title to drop (repeatable, case-insensitive)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,
        /// Print only the tables found in the file
        #[arg(long)]
        tables_only: bool,
    },
    /// Show the page families and their output files
    List,
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

    let result = match cli.command {
        Commands::Extract { family } => {
            let config = Config::load(&cli.config)?;
            let client = WikiClient::new(&config)?;
            let path = extract::run(family, &client, &config.output_folder).await?;
            println!("{}: wrote {}", family, path.display());
            Ok(())
        }
        Commands::All => {
            let config = Config::load(&cli.config)?;
            let client = WikiClient::new(&config)?;

            let mut failed = 0;
            for family in Family::ALL {
                match extract::run(family, &client, &config.output_folder).await {
                    Ok(path) => println!("{}: wrote {}", family, path.display()),
                    Err(e) => {
                        error!("{} failed: {:#}", family, e);
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} families failed", failed, Family::ALL.len());
            }
            Ok(())
        }
        Commands::Parse {
            file,
            exclude,
            tables_only,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let json = if tables_only {
                to_pretty_json(&parse_tables(&text))?
            } else {
                to_pretty_json(&extract_page(&text, exclude.as_slice()))?
            };
            println!("{json}");
            Ok(())
        }
        Commands::List => {
            println!("{:<18} | {:<10} | {:<28} | Excluded sections", "Family", "Page", "Output");
            println!("{}", "-".repeat(90));
            for family in Family::ALL {
                let excluded = family.excluded_sections();
                println!(
                    "{:<18} | {:<10} | {:<28} | {}",
                    family.name(),
                    family.page_title(),
                    family.output_file(),
                    if excluded.is_empty() { "-".to_string() } else { excluded.join(", ") }
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
