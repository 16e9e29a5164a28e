// src/metadata.rs

use serde::{Deserialize, Serialize};

/// One row of the full-text `images` table. Every column is optional
/// because rows are assembled one field at a time.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ImageRecord {
    pub path: String,
    pub album_relative_path: Option<String>,
    pub filename: Option<String>,
    pub geocode: Option<String>,
    pub exif: Option<String>,
    pub tags: Option<String>,
    pub colors: Option<String>,
    pub alt_text: Option<String>,
    pub critique: Option<String>,
    pub suggested_title: Option<String>,
    pub composition_critique: Option<String>,
    pub subject: Option<String>,
}

/// Writable columns of the `images` table. The column name is spliced into
/// SQL, so only these values can ever reach a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageField {
    AlbumRelativePath,
    Filename,
    Geocode,
    Exif,
    Tags,
    Colors,
    AltText,
    Critique,
    SuggestedTitle,
    CompositionCritique,
    Subject,
}

impl ImageField {
    pub fn column(self) -> &'static str {
        match self {
            ImageField::AlbumRelativePath => "album_relative_path",
            ImageField::Filename => "filename",
            ImageField::Geocode => "geocode",
            ImageField::Exif => "exif",
            ImageField::Tags => "tags",
            ImageField::Colors => "colors",
            ImageField::AltText => "alt_text",
            ImageField::Critique => "critique",
            ImageField::SuggestedTitle => "suggested_title",
            ImageField::CompositionCritique => "composition_critique",
            ImageField::Subject => "subject",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeoMetadata {
    pub path: String,
    pub lat_deg: Option<f64>,
    pub lng_deg: Option<f64>,
    pub iso8601: Option<String>,
}

/// A full-text hit: the stored record, a highlighted excerpt and the bm25
/// score (lower is more relevant).
#[derive(Debug, Serialize, Clone)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: ImageRecord,
    pub snippet: String,
    pub bm25: f64,
}
