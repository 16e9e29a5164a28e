use crate::error::AppError;
use globset::GlobBuilder;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Resolve a glob pattern to the files it matches, case-insensitively and in
/// lexicographic order. `*` stays within one directory, `**` crosses them.
///
/// Literal directories are matched case-insensitively too: the walk starts
/// at the deepest ancestor that exists as written.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>, AppError> {
    let matcher = GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let (root, depth) = existing_root(walk_bounds(pattern));
    let relative = root.as_os_str().is_empty();
    let walk_root = if relative { PathBuf::from(".") } else { root };
    log::info!("Starting file discovery in {:?} for {}", walk_root, pattern);

    let mut walker = WalkDir::new(&walk_root).follow_links(true);
    if let Some(depth) = depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_map(|e| {
        e.map_err(|err| log::warn!("Skipping unreadable entry: {}", err))
            .ok()
    }) {
        if !entry.file_type().is_file() {
            log::trace!("Skipping non-file entry: {:?}", entry.path());
            continue;
        }
        let path = if relative {
            entry.path().strip_prefix(".").unwrap_or(entry.path())
        } else {
            entry.path()
        };
        if matcher.is_match(path) {
            log::trace!("Discovered file: {:?}", path);
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    log::info!("File discovery complete: {} files", files.len());
    Ok(files)
}

/// The longest leading run of components without glob syntax, and how many
/// levels below it a match can sit (`None` when `**` makes it unbounded).
fn walk_bounds(pattern: &str) -> (PathBuf, Option<usize>) {
    let mut root = PathBuf::new();
    let mut rest = 0;
    let mut unbounded = false;
    let mut in_glob = false;

    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if !in_glob && (matches!(component, Component::Prefix(_) | Component::RootDir) || !text.contains(GLOB_META)) {
            root.push(component);
            continue;
        }
        in_glob = true;
        rest += 1;
        if text.contains("**") {
            unbounded = true;
        }
    }

    if !in_glob {
        // A literal path: the walk root is the file (or directory) itself.
        return (root, Some(0));
    }
    (root, if unbounded { None } else { Some(rest) })
}

/// Climb from `root` until it exists, widening the depth by one per level.
fn existing_root((mut root, mut depth): (PathBuf, Option<usize>)) -> (PathBuf, Option<usize>) {
    while !root.as_os_str().is_empty() && !root.exists() {
        if !root.pop() {
            break;
        }
        depth = depth.map(|d| d + 1);
    }
    (root, depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let album = tmp.path().join("album");
        std::fs::create_dir_all(album.join("sub")).unwrap();
        for name in ["b.JPG", "c.jpg", "d.png", "sub/e.jpg"] {
            std::fs::write(album.join(name), b"jpeg").unwrap();
        }
        tmp
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn star_matches_case_insensitively_in_one_directory() {
        let tmp = album();
        let pattern = format!("{}/album/*.jpg", tmp.path().display());
        assert_eq!(names(&discover(&pattern).unwrap()), vec!["b.JPG", "c.jpg"]);
    }

    #[test]
    fn double_star_recurses() {
        let tmp = album();
        let pattern = format!("{}/**/*.jpg", tmp.path().display());
        assert_eq!(
            names(&discover(&pattern).unwrap()),
            vec!["b.JPG", "c.jpg", "e.jpg"]
        );
    }

    #[test]
    fn literal_path_matches_itself() {
        let tmp = album();
        let pattern = format!("{}/album/d.png", tmp.path().display());
        assert_eq!(names(&discover(&pattern).unwrap()), vec!["d.png"]);
    }

    #[test]
    fn literal_directories_ignore_case() {
        let tmp = album();
        let pattern = format!("{}/ALBUM/*.jpg", tmp.path().display());
        assert_eq!(names(&discover(&pattern).unwrap()), vec!["b.JPG", "c.jpg"]);

        let pattern = format!("{}/Album/Sub/E.JPG", tmp.path().display());
        assert_eq!(names(&discover(&pattern).unwrap()), vec!["e.jpg"]);
    }

    #[test]
    fn existing_root_climbs_to_an_ancestor() {
        let tmp = album();
        assert_eq!(
            existing_root((tmp.path().join("ALBUM"), Some(1))),
            (tmp.path().to_path_buf(), Some(2))
        );
        assert_eq!(
            existing_root((tmp.path().join("album"), None)),
            (tmp.path().join("album"), None)
        );
        assert_eq!(existing_root((PathBuf::from("no-such-dir"), Some(1))), (PathBuf::new(), Some(2)));
    }

    #[test]
    fn missing_root_finds_nothing() {
        let tmp = album();
        let pattern = format!("{}/nope/*.jpg", tmp.path().display());
        assert!(discover(&pattern).unwrap().is_empty());
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(matches!(discover("photos/[a.jpg"), Err(AppError::Glob(_))));
    }

    #[test]
    fn bounds_stop_at_first_glob_component() {
        assert_eq!(
            walk_bounds("/srv/photos/*/IMG_*.jpg"),
            (PathBuf::from("/srv/photos"), Some(2))
        );
        assert_eq!(walk_bounds("photos/**/*.jpg"), (PathBuf::from("photos"), None));
        assert_eq!(walk_bounds("*.jpg"), (PathBuf::new(), Some(1)));
    }
}
