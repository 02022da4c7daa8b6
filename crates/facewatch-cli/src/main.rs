use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use facewatch_core::{enroll_from_image, Config, EnrollmentStore, OnnxAnalyzer, RecognitionLog};
use facewatch_hw::Camera;

#[derive(Parser)]
#[command(name = "facewatch-cli", about = "facewatch enrollment and log tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the first face found in an image
    Enroll {
        /// Name shown when this face is recognized
        #[arg(short, long)]
        name: String,
        /// Image file (png, jpg)
        image: PathBuf,
    },
    /// List enrolled faces
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a day's recognition log (default: today)
    Logs {
        /// Day to show, YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List V4L2 capture devices
    Devices,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Enroll { name, image } => {
            let name = name.trim();
            anyhow::ensure!(!name.is_empty(), "a name is required");

            let mut store = EnrollmentStore::load(&config.store_path)?;
            let mut analyzer = OnnxAnalyzer::load(&config.model_dir)
                .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))?;
            let embedding = enroll_from_image(&mut analyzer, &image)?;
            store.append_and_persist(name, embedding)?;
            println!(
                "Enrolled {name} ({} known face(s) in {})",
                store.len(),
                store.path().display()
            );
        }
        Commands::List { json } => {
            let store = EnrollmentStore::load(&config.store_path)?;
            if json {
                let entries: Vec<_> = store
                    .identities()
                    .iter()
                    .enumerate()
                    .map(|(index, identity)| {
                        serde_json::json!({
                            "index": index,
                            "name": identity.name,
                            "dimensions": identity.embedding.values.len(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if store.is_empty() {
                println!("No faces enrolled");
            } else {
                for (index, identity) in store.identities().iter().enumerate() {
                    println!("{index:>3}  {}", identity.name);
                }
            }
        }
        Commands::Logs { date } => {
            let log = RecognitionLog::new(&config.log_dir);
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            match log.read_day(date)? {
                Some(contents) => print!("{contents}"),
                None => println!("No logs found for {date}"),
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_logs_date() {
        let cli = Cli::try_parse_from(["facewatch-cli", "logs", "--date", "2024-05-01"]).unwrap();
        match cli.command {
            Commands::Logs { date } => assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1)),
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn test_enroll_requires_name() {
        assert!(Cli::try_parse_from(["facewatch-cli", "enroll", "face.jpg"]).is_err());
    }
}
