mod catalog;
mod classifier;
mod classifiers;
mod cli;
mod config;
mod error;
mod exif_data;
mod extractor;
mod geocode;
mod indexer;
mod metadata;
mod palette;
mod processor;
mod pruner;
mod search;
mod walker;
mod web_server;

use crate::catalog::Catalog;
use crate::cli::{Cli, Command, GlobArgs};
use crate::config::AppConfig;
use crate::exif_data::KamadakExif;
use crate::extractor::Extractor;
use crate::geocode::{NoGeocoder, PlacesGeocoder, ReverseGeocoder};
use crate::indexer::{IndexOptions, IndexReport, Indexer, Progress};
use crate::palette::HistogramPalette;
use crate::processor::Collaborators;
use anyhow::Result;
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn log_progress(progress: &Progress) {
    info!("{}", progress.describe());
    log::debug!(
        "{} extraction ran from {:.3} to {:.3} (unix seconds)",
        progress.path.display(),
        unix_secs(progress.started),
        unix_secs(progress.finished)
    );
}

fn unix_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

async fn run_index(config: &AppConfig, catalog: &mut Catalog, args: &GlobArgs) -> Result<IndexReport> {
    let classifier = classifiers::from_config(&config.classifier)?;
    let geocoder: Box<dyn ReverseGeocoder> = match &config.geocoder.places_path {
        Some(places) => Box::new(PlacesGeocoder::load(Path::new(places))?),
        None => {
            info!("No places file configured, photos will not be geocoded");
            Box::new(NoGeocoder)
        }
    };
    let palette = HistogramPalette::default();
    let collaborators = Collaborators {
        exif: &KamadakExif,
        geocoder: geocoder.as_ref(),
        palette: &palette,
        classifier: classifier.as_ref(),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping after the current photo");
            on_interrupt.cancel();
        }
    });

    let (progress_tx, progress_rx) = crossbeam_channel::unbounded::<Progress>();
    let progress_handle = tokio::task::spawn_blocking(move || {
        for progress in progress_rx {
            log_progress(&progress);
        }
    });

    let options = IndexOptions {
        dry_run: args.dry_run,
        palette_size: config.palette_size,
        keep_degraded: config.extraction.keep_degraded,
    };
    let report = {
        let mut indexer = Indexer::new(
            catalog,
            collaborators,
            Extractor::new(config.extraction.max_attempts),
            options,
        )
        .with_progress(progress_tx)
        .with_cancellation(cancel);
        indexer.run(&args.glob).await
    };

    // The sender went away with the indexer, so the drain loop has ended.
    progress_handle.await?;
    Ok(report?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::new()?;

    // Initialize env_logger from the CLI flags, else config.log_level
    let level = cli
        .log_level()
        .unwrap_or_else(|| config.log_level.parse().unwrap_or(log::LevelFilter::Info));
    env_logger::Builder::new().filter_level(level).init();

    let db_path = cli
        .dbpath
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.db_path));
    let mut catalog = Catalog::open(&db_path)?;
    info!("Using catalog {:?} ({} images)", db_path, catalog.count_images()?);

    match cli.command {
        Command::Index(args) => {
            let report = run_index(&config, &mut catalog, &args).await?;
            print_json(&report)?;
        }
        Command::Prune(args) => {
            print_json(&pruner::prune(&mut catalog, &args.glob, args.dry_run)?)?;
        }
        Command::Search(args) => {
            print_json(&catalog.search(&args.query, args.limit, args.offset)?)?;
        }
        Command::SearchTags(args) => {
            print_json(&catalog.search_tags(&args.query, args.limit)?)?;
        }
        Command::SearchMetadata(args) => {
            print_json(&catalog.search_metadata(&args.query)?)?;
        }
        Command::Dump => {
            print_json(&catalog.inspect_all()?)?;
        }
        Command::Serve => {
            web_server::start_web_server(catalog, config.web.port).await?;
        }
    }

    Ok(())
}
