//! SQLite-backed catalog: an FTS5 `images` table, a `tags` frequency table and
//! a `metadata` table of coordinates and capture times.
//!
//! The store assumes a single writer process. FTS5 has no `UPSERT`, so field
//! writes are a read-count-then-branch inside one transaction, which is only
//! correct while nobody else writes the file.

use crate::error::AppError;
use crate::metadata::{GeoMetadata, ImageField, ImageRecord, SearchHit, TagCount};
use crate::search;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;

/// Page size of the shipped catalog file.
const PAGE_SIZE: i64 = 1024;

const SCHEMA: &str = r"
CREATE VIRTUAL TABLE IF NOT EXISTS images USING fts5(
    path,
    album_relative_path,
    filename,
    geocode,
    exif,
    tags,
    colors,
    alt_text,
    critique,
    suggested_title,
    composition_critique,
    subject,
    tokenize = 'porter trigram'
);

CREATE TABLE IF NOT EXISTS tags (
    tag VARCHAR PRIMARY KEY,
    count INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS metadata (
    path VARCHAR PRIMARY KEY,
    lat_deg REAL,
    lng_deg REAL,
    iso8601 TEXT
);
";

const IMAGE_COLUMNS: &str = "path, album_relative_path, filename, geocode, exif, tags, colors, \
     alt_text, critique, suggested_title, composition_critique, subject";

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the store file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        log::debug!("Opening catalog at {:?} (sqlite {})", path, rusqlite::version());
        let conn = Connection::open(path)?;
        let mut catalog = Self { conn };
        catalog.setup()?;
        Ok(catalog)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut catalog = Self {
            conn: Connection::open_in_memory()?,
        };
        catalog.setup()?;
        Ok(catalog)
    }

    /// Apply storage pragmas and create missing tables. Safe on every start.
    ///
    /// `page_size` only takes effect on an empty file or after `compact`.
    pub fn setup(&mut self) -> Result<(), AppError> {
        self.conn.pragma_update(None, "page_size", PAGE_SIZE)?;
        let journal_mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
        log::trace!("Catalog journal mode: {}", journal_mode);
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// True when the searchable table already holds a row for `path`.
    pub fn exists(&self, path: &str) -> Result<bool, AppError> {
        Ok(self.count_rows(path)? > 0)
    }

    fn count_rows(&self, path: &str) -> Result<i64, AppError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE path = ?1",
            [path],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Set one column of the record for `path`, creating the row if needed.
    pub fn upsert_field(
        &mut self,
        path: &str,
        field: ImageField,
        value: &str,
    ) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM images WHERE path = ?1",
            [path],
            |row| row.get(0),
        )?;

        if count > 0 {
            tx.execute(
                &format!("UPDATE images SET {} = ?1 WHERE path = ?2", field.column()),
                params![value, path],
            )?;
        } else {
            // The FTS rowid is generated, so INSERT OR IGNORE would never collide.
            tx.execute(
                &format!("INSERT INTO images (path, {}) VALUES (?1, ?2)", field.column()),
                params![path, value],
            )?;
        }
        tx.commit()?;
        log::trace!("Wrote {} for {}", field.column(), path);
        Ok(())
    }

    pub fn upsert_geocode(&mut self, path: &str, geocode: &str) -> Result<(), AppError> {
        self.upsert_field(path, ImageField::Geocode, geocode)
    }

    pub fn upsert_metadata(
        &mut self,
        path: &str,
        lat_deg: Option<f64>,
        lng_deg: Option<f64>,
        iso8601: Option<&str>,
    ) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO metadata (path, lat_deg, lng_deg, iso8601) VALUES (?1, ?2, ?3, ?4)",
            params![path, lat_deg, lng_deg, iso8601],
        )?;
        tx.execute(
            "UPDATE metadata SET lat_deg = ?1, lng_deg = ?2, iso8601 = ?3 WHERE path = ?4",
            params![lat_deg, lng_deg, iso8601, path],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Count one more occurrence of `tag`, creating it at 1.
    ///
    /// Counts only ever grow: pruning an image leaves them untouched.
    pub fn increment_tag(&mut self, tag: &str) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO tags (tag, count) VALUES (?1, 0)",
            [tag],
        )?;
        tx.execute("UPDATE tags SET count = count + 1 WHERE tag = ?1", [tag])?;
        tx.commit()?;
        Ok(())
    }

    /// Ranked full-text search over every column except the path-like ones.
    ///
    /// `query` is an FTS5 expression. Results are ordered by bm25; equal
    /// scores come back in whatever order SQLite produces.
    pub fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<SearchHit>, AppError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {IMAGE_COLUMNS}, \
             snippet(images, -1, '<i class=\"snippet\">', '</i>', '…', 24) AS snippet, \
             bm25(images) AS bm25 \
             FROM images \
             WHERE images MATCH ?1 \
             ORDER BY rank \
             LIMIT ?2 \
             OFFSET ?3"
        ))?;

        let limit = sql_limit(limit);
        let offset = i64::try_from(offset.unwrap_or(0)).unwrap_or(i64::MAX);

        let hits = stmt
            .query_map(
                params![search::match_expression(query), limit, offset],
                |row| {
                    Ok(SearchHit {
                        record: image_record(row)?,
                        snippet: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                        bm25: row.get(13)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Search {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// Tags containing `query`, most frequent first.
    pub fn search_tags(&self, query: &str, limit: Option<usize>) -> Result<Vec<TagCount>, AppError> {
        let mut stmt = self.conn.prepare(
            r"SELECT tag, count FROM tags
              WHERE tag LIKE ?1 ESCAPE '\'
              ORDER BY count DESC
              LIMIT ?2",
        )?;
        let limit = sql_limit(limit);
        let tags = stmt
            .query_map(params![search::like_pattern(query), limit], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Metadata rows whose path contains `query`.
    pub fn search_metadata(&self, query: &str) -> Result<Vec<GeoMetadata>, AppError> {
        let mut stmt = self.conn.prepare(
            r"SELECT path, lat_deg, lng_deg, iso8601 FROM metadata
              WHERE path LIKE ?1 ESCAPE '\'
              ORDER BY path",
        )?;
        let rows = stmt
            .query_map([search::like_pattern(query)], |row| {
                Ok(GeoMetadata {
                    path: row.get(0)?,
                    lat_deg: row.get(1)?,
                    lng_deg: row.get(2)?,
                    iso8601: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, path: &str) -> Result<Option<ImageRecord>, AppError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE path = ?1 LIMIT 1"),
                [path],
                image_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Every path known to either the searchable table or the metadata table.
    pub fn list_paths(&self) -> Result<BTreeSet<String>, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM images UNION SELECT path FROM metadata")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(paths)
    }

    /// Remove `path` from both tables. Each delete is a no-op when repeated,
    /// so the pair does not need to share a transaction.
    pub fn delete_path(&mut self, path: &str) -> Result<(), AppError> {
        let images = self.conn.execute("DELETE FROM images WHERE path = ?1", [path])?;
        let metadata = self.conn.execute("DELETE FROM metadata WHERE path = ?1", [path])?;
        log::debug!(
            "Deleted {} ({} image rows, {} metadata rows)",
            path,
            images,
            metadata
        );
        Ok(())
    }

    pub fn inspect_all(&self) -> Result<Vec<ImageRecord>, AppError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {IMAGE_COLUMNS} FROM images"))?;
        let records = stmt
            .query_map([], image_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count_images(&self) -> Result<u64, AppError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Merge FTS segments and rebuild the file, which also applies the page size.
    pub fn compact(&mut self) -> Result<(), AppError> {
        self.conn
            .execute("INSERT INTO images(images) VALUES ('optimize')", [])?;
        self.conn.execute_batch("VACUUM")?;
        log::debug!("Catalog compacted");
        Ok(())
    }
}

/// SQLite reads a negative LIMIT as no limit, so `None` maps to -1 and
/// anything past `i64::MAX` saturates instead of wrapping negative.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn image_record(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        path: row.get(0)?,
        album_relative_path: row.get(1)?,
        filename: row.get(2)?,
        geocode: row.get(3)?,
        exif: row.get(4)?,
        tags: row.get(5)?,
        colors: row.get(6)?,
        alt_text: row.get(7)?,
        critique: row.get(8)?,
        suggested_title: row.get(9)?,
        composition_critique: row.get(10)?,
        subject: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/photos/zanzibar/IMG_0001.jpg";

    fn catalog_with_photo() -> Catalog {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog
            .upsert_field(PATH, ImageField::Filename, "IMG_0001.jpg")
            .unwrap();
        catalog
            .upsert_field(
                PATH,
                ImageField::AlbumRelativePath,
                "/album/zanzibar#IMG_0001.jpg",
            )
            .unwrap();
        catalog
            .upsert_field(PATH, ImageField::AltText, "a wooden dhow at sunset")
            .unwrap();
        catalog
            .upsert_metadata(PATH, Some(-6.16), Some(39.19), Some("2021-07-01T18:02:11Z"))
            .unwrap();
        catalog
    }

    #[test]
    fn setup_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("catalog.sqlite");
        {
            let mut catalog = Catalog::open(&db_path).unwrap();
            catalog.upsert_field(PATH, ImageField::Filename, "IMG_0001.jpg").unwrap();
            catalog.setup().unwrap();
        }
        let catalog = Catalog::open(&db_path).unwrap();
        assert!(catalog.exists(PATH).unwrap());
        assert_eq!(catalog.count_images().unwrap(), 1);
    }

    #[test]
    fn upsert_field_updates_in_place() {
        let mut catalog = catalog_with_photo();
        catalog
            .upsert_field(PATH, ImageField::AltText, "a dhow under full sail")
            .unwrap();

        assert_eq!(catalog.count_images().unwrap(), 1);
        let record = catalog.get(PATH).unwrap().unwrap();
        assert_eq!(record.alt_text.as_deref(), Some("a dhow under full sail"));
        assert_eq!(record.filename.as_deref(), Some("IMG_0001.jpg"));
        assert!(record.critique.is_none());
    }

    #[test]
    fn exists_is_exact_match() {
        let catalog = catalog_with_photo();
        assert!(catalog.exists(PATH).unwrap());
        assert!(!catalog.exists("/photos/zanzibar/IMG_0001.missing").unwrap());
        assert!(!catalog.exists("/photos/zanzibar").unwrap());
    }

    #[test]
    fn increment_tag_starts_at_one() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.increment_tag("boat").unwrap();
        assert_eq!(
            catalog.search_tags("boat", None).unwrap(),
            vec![TagCount { tag: "boat".into(), count: 1 }]
        );

        catalog.increment_tag("boat").unwrap();
        assert_eq!(catalog.search_tags("boat", None).unwrap()[0].count, 2);
    }

    #[test]
    fn search_tags_orders_by_count_and_matches_literally() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        for tag in ["red_car", "red_car", "red_car", "redxcar", "red_cart", "blue_car"] {
            catalog.increment_tag(tag).unwrap();
        }

        let tags = catalog.search_tags("red_car", None).unwrap();
        let names: Vec<_> = tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(names[0], "red_car");
        assert!(names.contains(&"red_cart"));
        assert!(!names.contains(&"redxcar"));

        assert_eq!(catalog.search_tags("car", Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn upsert_metadata_overwrites() {
        let mut catalog = catalog_with_photo();
        catalog.upsert_metadata(PATH, None, None, None).unwrap();

        let rows = catalog.search_metadata("zanzibar").unwrap();
        assert_eq!(
            rows,
            vec![GeoMetadata {
                path: PATH.into(),
                lat_deg: None,
                lng_deg: None,
                iso8601: None,
            }]
        );
    }

    #[test]
    fn search_ranks_descriptive_text() {
        let mut catalog = catalog_with_photo();
        let other = "/photos/market/IMG_0002.jpg";
        catalog
            .upsert_field(other, ImageField::AltText, "spices piled in a market stall")
            .unwrap();

        let hits = catalog.search("sunset", None, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.path, PATH);
        assert!(hits[0].snippet.contains("<i class=\"snippet\">"));

        assert_eq!(catalog.search("spices", Some(10), Some(0)).unwrap().len(), 1);
        assert!(catalog.search("spices", Some(10), Some(1)).unwrap().is_empty());
        assert!(catalog.search("   ", None, None).unwrap().is_empty());
    }

    #[test]
    fn huge_limit_and_offset_do_not_wrap() {
        let catalog = catalog_with_photo();
        assert!(catalog.search("sunset", Some(10), Some(usize::MAX)).unwrap().is_empty());
        assert_eq!(catalog.search("sunset", Some(usize::MAX), None).unwrap().len(), 1);

        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(usize::MAX)), i64::MAX);
        assert_eq!(sql_limit(Some(5)), 5);
    }

    #[test]
    fn huge_tag_limit_returns_everything() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.increment_tag("boat").unwrap();
        catalog.increment_tag("boathouse").unwrap();
        assert_eq!(catalog.search_tags("boat", Some(usize::MAX)).unwrap().len(), 2);
    }

    #[test]
    fn search_skips_path_columns() {
        let catalog = catalog_with_photo();
        assert!(catalog.search("zanzibar", None, None).unwrap().is_empty());

        let rows = catalog.search_metadata("zanzibar").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, PATH);
    }

    #[test]
    fn list_paths_unions_both_tables() {
        let mut catalog = catalog_with_photo();
        catalog
            .upsert_metadata("/photos/only-metadata.jpg", None, None, None)
            .unwrap();
        catalog
            .upsert_field("/photos/only-image.jpg", ImageField::Filename, "only-image.jpg")
            .unwrap();

        let paths = catalog.list_paths().unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(PATH));
        assert!(paths.contains("/photos/only-metadata.jpg"));
        assert!(paths.contains("/photos/only-image.jpg"));
    }

    #[test]
    fn delete_path_removes_from_both_tables() {
        let mut catalog = catalog_with_photo();
        catalog.delete_path(PATH).unwrap();
        catalog.delete_path(PATH).unwrap();

        assert!(!catalog.list_paths().unwrap().contains(PATH));
        assert!(!catalog.exists(PATH).unwrap());
        assert!(catalog.search_metadata("zanzibar").unwrap().is_empty());
    }

    #[test]
    fn compact_keeps_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(&tmp.path().join("catalog.sqlite")).unwrap();
        catalog.upsert_field(PATH, ImageField::AltText, "a wooden dhow").unwrap();
        catalog.compact().unwrap();

        assert_eq!(catalog.inspect_all().unwrap().len(), 1);
        let page_size: i64 = catalog
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap();
        assert_eq!(page_size, PAGE_SIZE);
    }
}
