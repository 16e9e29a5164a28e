//! One indexing pass: discover, skip what the catalog already holds, then
//! analyse and write each remaining photo strictly one at a time.

use crate::catalog::Catalog;
use crate::error::AppError;
use crate::extractor::Extractor;
use crate::metadata::ImageField;
use crate::processor::{self, Analysis, Collaborators};
use crate::palette;
use crate::walker;
use crossbeam_channel::Sender;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;

/// Emitted after every processed photo.
#[derive(Debug, Clone)]
pub struct Progress {
    /// 1-based position within this pass.
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
    pub attempts: usize,
    pub degraded: bool,
    /// Wall-clock start and end of this photo's extraction.
    pub started: SystemTime,
    pub finished: SystemTime,
    pub elapsed: Duration,
    /// Photos per second since the pass started.
    pub rate: f64,
    pub eta: Duration,
}

impl Progress {
    /// `[i/n] path (attempts, seconds spent; rate, eta)` for the operator log.
    pub fn describe(&self) -> String {
        format!(
            "[{}/{}] {} ({} attempt{}, {:.2}s; {:.2} img/s, eta {}s){}",
            self.index,
            self.total,
            self.path.display(),
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.elapsed.as_secs_f64(),
            self.rate,
            self.eta.as_secs(),
            if self.degraded { " degraded" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub pattern: String,
    pub found: usize,
    pub skipped: usize,
    pub pending: Vec<PathBuf>,
    pub indexed: usize,
    pub degraded: usize,
    pub cancelled: bool,
}

impl IndexReport {
    pub fn summary(&self) -> String {
        format!(
            "Found {} files for the glob pattern {}\nIndexing {} unindexed files (skipping {} already-indexed)",
            self.found,
            self.pattern,
            self.pending.len(),
            self.skipped
        )
    }
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub dry_run: bool,
    pub palette_size: usize,
    pub keep_degraded: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            palette_size: 3,
            keep_degraded: true,
        }
    }
}

pub struct Indexer<'a> {
    catalog: &'a mut Catalog,
    collaborators: Collaborators<'a>,
    extractor: Extractor,
    options: IndexOptions,
    progress: Option<Sender<Progress>>,
    cancel: CancellationToken,
}

impl<'a> Indexer<'a> {
    pub fn new(
        catalog: &'a mut Catalog,
        collaborators: Collaborators<'a>,
        extractor: Extractor,
        options: IndexOptions,
    ) -> Self {
        Self {
            catalog,
            collaborators,
            extractor,
            options,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&mut self, pattern: &str) -> Result<IndexReport, AppError> {
        let files = walker::discover(pattern)?;

        // Nothing expensive may happen for a path the catalog already knows.
        let mut pending = Vec::new();
        for file in &files {
            if !self.catalog.exists(&path_key(file))? {
                pending.push(file.clone());
            }
        }

        let mut report = IndexReport {
            pattern: pattern.to_string(),
            found: files.len(),
            skipped: files.len() - pending.len(),
            pending,
            ..Default::default()
        };
        for line in report.summary().lines() {
            log::info!("{}", line);
        }

        if self.options.dry_run {
            for path in &report.pending {
                log::debug!("Would index {:?}", path);
            }
            return Ok(report);
        }

        let total = report.pending.len();
        let pass_started = Instant::now();
        for (i, path) in report.pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Indexing cancelled with {} files left", total - i);
                report.cancelled = true;
                break;
            }

            log::info!("[{}/{}] Indexing {:?}", i + 1, total, path);
            let analysis = processor::analyse_image(
                path,
                &self.collaborators,
                &self.extractor,
                self.options.palette_size,
            )
            .await?;

            if analysis.extraction.degraded {
                report.degraded += 1;
            }
            if analysis.extraction.degraded && !self.options.keep_degraded {
                log::warn!("Not writing degraded {:?}, it will be retried next pass", path);
            } else {
                self.write(path, &analysis)?;
                report.indexed += 1;
            }

            self.report_progress(i + 1, total, path, &analysis, pass_started)?;
        }

        if report.indexed > 0 {
            self.catalog.compact()?;
        }
        log::info!(
            "Indexed {} files ({} degraded){}",
            report.indexed,
            report.degraded,
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    fn write(&mut self, path: &Path, analysis: &Analysis) -> Result<(), AppError> {
        let key = path_key(path);
        let catalog = &mut *self.catalog;

        catalog.upsert_field(&key, ImageField::Filename, &processor::filename(path))?;
        catalog.upsert_field(
            &key,
            ImageField::AlbumRelativePath,
            &processor::album_relative_path(path),
        )?;
        catalog.upsert_field(&key, ImageField::Exif, &processor::format_exif(&analysis.exif))?;
        catalog.upsert_field(&key, ImageField::Colors, &palette::format_palette(&analysis.colors))?;

        if let Some(geocode) = &analysis.geocode {
            catalog.upsert_geocode(&key, &geocode.flatten())?;
            for tag in geocode.pseudo_tags() {
                if !tag.is_empty() {
                    catalog.increment_tag(tag)?;
                }
            }
        }

        catalog.upsert_field(&key, ImageField::Tags, &analysis.tags.join(", "))?;
        for tag in &analysis.tags {
            catalog.increment_tag(tag)?;
        }

        if let Some(description) = &analysis.extraction.description {
            catalog.upsert_field(&key, ImageField::AltText, &description.alt_text)?;
            catalog.upsert_field(&key, ImageField::Critique, &description.critique)?;
            catalog.upsert_field(&key, ImageField::SuggestedTitle, &description.suggested_title)?;
            catalog.upsert_field(
                &key,
                ImageField::CompositionCritique,
                &description.composition_critique,
            )?;
            catalog.upsert_field(&key, ImageField::Subject, &description.subject)?;
        }

        catalog.upsert_metadata(
            &key,
            analysis.lat_deg,
            analysis.lng_deg,
            analysis.iso8601.as_deref(),
        )?;
        Ok(())
    }

    fn report_progress(
        &self,
        index: usize,
        total: usize,
        path: &Path,
        analysis: &Analysis,
        pass_started: Instant,
    ) -> Result<(), AppError> {
        let Some(progress) = &self.progress else {
            return Ok(());
        };

        let secs = pass_started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { index as f64 / secs } else { 0.0 };
        let eta = if rate > 0.0 {
            Duration::from_secs_f64((total - index) as f64 / rate)
        } else {
            Duration::ZERO
        };

        progress.send(Progress {
            index,
            total,
            path: path.to_path_buf(),
            attempts: analysis.extraction.attempts,
            degraded: analysis.extraction.degraded,
            started: analysis.extraction.started,
            finished: analysis.extraction.started + analysis.extraction.elapsed,
            elapsed: analysis.extraction.elapsed,
            rate,
            eta,
        })?;
        Ok(())
    }
}

/// The catalog key for a discovered file: the path exactly as discovered.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
