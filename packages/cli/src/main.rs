#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for running the site progress pipeline on local photos.
//!
//! ```text
//! site_progress_cli analyze --image photo.jpg --activity "asphalt laying" --location "Elm-7"
//! site_progress_cli show --location "Elm-7"
//! site_progress_cli key "Main St. #5"
//! ```
//!
//! Reports are read from and written to `REPORTS_DIR` (default
//! `data/reports`). `analyze` also needs `VISION_BASE_URL`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use site_progress_analysis::{AnalysisRequest, Analyzer};
use site_progress_store::{JsonFileStore, ReportStore as _, key_for};

#[derive(Parser)]
#[command(
    name = "site_progress_cli",
    about = "Analyze construction site photos and inspect stored progress reports"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a photo and store the resulting report
    Analyze {
        /// Path to the site photo
        #[arg(long)]
        image: PathBuf,
        /// Declared construction activity (e.g. "asphalt laying")
        #[arg(long)]
        activity: String,
        /// Location stretch the photo was taken at
        #[arg(long)]
        location: String,
    },
    /// Print the latest stored report for a location
    Show {
        /// Location stretch
        #[arg(long)]
        location: String,
    },
    /// Print the storage key derived from a location string
    Key {
        /// Location stretch
        location: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            image,
            activity,
            location,
        } => {
            let image_bytes = tokio::fs::read(&image).await?;
            let filename = image
                .file_name()
                .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

            log::info!("Analyzing {} for '{location}'", image.display());

            let capabilities = site_progress_vision::create_capabilities_from_env()?;
            let store = Arc::new(JsonFileStore::from_env());
            let analyzer = Analyzer::new(capabilities, store);

            let report = analyzer
                .analyze(AnalysisRequest {
                    image_bytes,
                    content_type: None,
                    activity_type: activity,
                    location_stretch: location,
                    filename,
                })
                .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Show { location } => {
            let store = JsonFileStore::from_env();

            if let Some(report) = store.load_latest(&location).await? {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                eprintln!("No report stored for location: {location}");
                std::process::exit(1);
            }
        }
        Commands::Key { location } => {
            println!("{}", key_for(&location));
        }
    }

    Ok(())
}
