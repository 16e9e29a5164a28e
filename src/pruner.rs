use crate::catalog::Catalog;
use crate::error::AppError;
use crate::indexer::path_key;
use crate::walker;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub catalogued: usize,
    pub on_disk: usize,
    /// Catalogued paths the pattern no longer matches, in path order.
    pub to_delete: Vec<String>,
    pub deleted: usize,
}

/// Remove every catalogued path that `pattern` no longer matches on disk.
///
/// Tag counts are left as they are. With `dry_run` the stale paths are only
/// reported.
pub fn prune(catalog: &mut Catalog, pattern: &str, dry_run: bool) -> Result<PruneReport, AppError> {
    let catalogued = catalog.list_paths()?;
    let on_disk: BTreeSet<String> = walker::discover(pattern)?
        .iter()
        .map(|p| path_key(p))
        .collect();

    let to_delete: Vec<String> = catalogued.difference(&on_disk).cloned().collect();
    log::info!(
        "{} catalogued, {} on disk, {} to delete",
        catalogued.len(),
        on_disk.len(),
        to_delete.len()
    );

    let mut report = PruneReport {
        catalogued: catalogued.len(),
        on_disk: on_disk.len(),
        to_delete,
        deleted: 0,
    };
    if dry_run {
        return Ok(report);
    }

    for path in &report.to_delete {
        log::info!("Deleting {}", path);
        catalog.delete_path(path)?;
        report.deleted += 1;
    }
    if report.deleted > 0 {
        catalog.compact()?;
    }
    Ok(report)
}
