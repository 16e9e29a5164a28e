use crate::classifier::Classifier;
use crate::error::AppError;
use crate::exif_data::{self, ExifSource, ExifTags};
use crate::extractor::{Extraction, Extractor};
use crate::geocode::{Geocode, ReverseGeocoder};
use crate::palette::{PaletteExtractor, Rgb};
use std::collections::HashSet;
use std::path::Path;

/// The external capabilities one indexing pass relies on.
pub struct Collaborators<'a> {
    pub exif: &'a dyn ExifSource,
    pub geocoder: &'a dyn ReverseGeocoder,
    pub palette: &'a dyn PaletteExtractor,
    pub classifier: &'a dyn Classifier,
}

/// Everything derived from one photo before it is written to the catalog.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub exif: ExifTags,
    pub lat_deg: Option<f64>,
    pub lng_deg: Option<f64>,
    pub geocode: Option<Geocode>,
    pub iso8601: Option<String>,
    pub colors: Vec<Rgb>,
    pub extraction: Extraction,
    /// Normalized, de-duplicated model tags.
    pub tags: Vec<String>,
}

pub async fn analyse_image(
    path: &Path,
    collaborators: &Collaborators<'_>,
    extractor: &Extractor,
    palette_size: usize,
) -> Result<Analysis, AppError> {
    let exif = collaborators.exif.read(path)?;

    let (lat_deg, lng_deg, geocode) = match exif_data::gps_degrees(&exif) {
        Some((lat, lng)) => {
            let geocode = collaborators.geocoder.lookup(lat, lng);
            log::debug!("GPS for {:?}: ({}, {}) -> {:?}", path, lat, lng, geocode);
            (Some(lat), Some(lng), geocode)
        }
        None => {
            log::debug!("No usable GPS data for {:?}, skipping geocoding", path);
            (None, None, None)
        }
    };

    let colors = collaborators.palette.dominant_colors(path, palette_size)?;
    log::trace!("Palette for {:?}: {:?}", path, colors);

    let hint = geocode.as_ref().map(Geocode::hint);
    let extraction = extractor
        .extract(collaborators.classifier, path, hint.as_deref())
        .await?;
    let tags = normalize_tags(&extraction.tags);

    Ok(Analysis {
        iso8601: exif_data::capture_iso8601(&exif),
        exif,
        lat_deg,
        lng_deg,
        geocode,
        colors,
        extraction,
        tags,
    })
}

/// Case-fold, turn spaces into underscores and drop duplicates, keeping the
/// first occurrence. Folding happens before de-duplication, so `Red Car` and
/// `red car` become one `red_car`.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|tag| tag.trim().to_lowercase().replace(' ', "_"))
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// `/album/<parent-dir>#<filename>`, the display path used by the album site.
pub fn album_relative_path(path: &Path) -> String {
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    format!("/album/{}#{}", parent, filename(path))
}

pub fn filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `key:value` per line in key order.
pub fn format_exif(tags: &ExifTags) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_data::ExifValue;

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn tag_case_and_spaces_fold_to_one() {
        assert_eq!(
            normalize_tags(&strings(&["Red Car", "red car", " red car "])),
            vec!["red_car"]
        );
    }

    #[test]
    fn tags_keep_first_seen_order() {
        assert_eq!(
            normalize_tags(&strings(&["Spider Monkey", "milk_can", "", "MILK_CAN", "siamang"])),
            vec!["spider_monkey", "milk_can", "siamang"]
        );
    }

    #[test]
    fn album_path_uses_parent_dir() {
        assert_eq!(
            album_relative_path(Path::new("/srv/albums/japan-2019/IMG_0042.JPG")),
            "/album/japan-2019#IMG_0042.JPG"
        );
        assert_eq!(album_relative_path(Path::new("lonely.jpg")), "/album/#lonely.jpg");
        assert_eq!(filename(Path::new("/srv/albums/japan-2019/IMG_0042.JPG")), "IMG_0042.JPG");
    }

    #[test]
    fn exif_flattens_sorted() {
        let mut tags = ExifTags::new();
        tags.insert("Image Model".into(), ExifValue::text("X100V"));
        tags.insert("Image Make".into(), ExifValue::text("FUJIFILM"));
        assert_eq!(format_exif(&tags), "Image Make:FUJIFILM\nImage Model:X100V");
        assert_eq!(format_exif(&ExifTags::new()), "");
    }
}
