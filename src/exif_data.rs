use crate::error::AppError;
use exif::{Context, In, Reader, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const GPS_LATITUDE: &str = "GPS GPSLatitude";
pub const GPS_LATITUDE_REF: &str = "GPS GPSLatitudeRef";
pub const GPS_LONGITUDE: &str = "GPS GPSLongitude";
pub const GPS_LONGITUDE_REF: &str = "GPS GPSLongitudeRef";
pub const DATE_TIME_ORIGINAL: &str = "EXIF DateTimeOriginal";

/// EXIF tags keyed `"<group> <TagName>"`, e.g. `GPS GPSLatitude`.
pub type ExifTags = BTreeMap<String, ExifValue>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExifValue {
    /// Human readable rendering, the raw string for ASCII tags.
    pub text: String,
    /// Numeric components, rationals already divided out.
    pub numbers: Vec<f64>,
}

impl ExifValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            numbers: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn numbers(numbers: Vec<f64>) -> Self {
        let text = format!(
            "[{}]",
            numbers
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self { text, numbers }
    }
}

impl fmt::Display for ExifValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub trait ExifSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<ExifTags, AppError>;
}

/// Reads EXIF from JPEG/TIFF/HEIF/PNG/WebP containers with kamadak-exif.
pub struct KamadakExif;

impl ExifSource for KamadakExif {
    fn read(&self, path: &Path) -> Result<ExifTags, AppError> {
        log::trace!("Extracting EXIF data for image: {:?}", path);
        let file = File::open(path)?;
        let mut buf_reader = BufReader::new(file);

        let exif = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(exif) => exif,
            Err(exif::Error::Io(e)) => return Err(e.into()),
            Err(e) => {
                log::debug!("No EXIF data found for {:?}: {}", path, e);
                return Ok(ExifTags::new());
            }
        };

        let mut tags = ExifTags::new();
        for field in exif.fields() {
            let value = match &field.value {
                // Binary blobs (maker notes, embedded thumbnails) are never stored.
                Value::Undefined(..) | Value::Unknown(..) => continue,
                Value::Ascii(parts) => ExifValue::text(
                    parts
                        .iter()
                        .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
                Value::Rational(v) => ExifValue {
                    text: field.display_value().to_string(),
                    numbers: v.iter().map(|r| r.to_f64()).collect(),
                },
                Value::SRational(v) => ExifValue {
                    text: field.display_value().to_string(),
                    numbers: v.iter().map(|r| r.to_f64()).collect(),
                },
                other => ExifValue {
                    text: field.display_value().to_string(),
                    numbers: (0..)
                        .map_while(|i| other.get_uint(i).map(f64::from))
                        .collect(),
                },
            };
            tags.insert(format!("{} {}", group(field), field.tag), value);
        }

        log::trace!("Read {} EXIF tags from {:?}", tags.len(), path);
        Ok(tags)
    }
}

fn group(field: &exif::Field) -> &'static str {
    if field.ifd_num == In::THUMBNAIL {
        return "Thumbnail";
    }
    #[allow(unreachable_patterns)]
    match field.tag.context() {
        Context::Tiff => "Image",
        Context::Exif => "EXIF",
        Context::Gps => "GPS",
        Context::Interop => "Interoperability",
        _ => "Image",
    }
}

/// Signed decimal degrees, or `None` unless latitude, longitude and both
/// hemisphere references are present and well formed.
pub fn gps_degrees(tags: &ExifTags) -> Option<(f64, f64)> {
    let lat = tags.get(GPS_LATITUDE)?;
    let lat_ref = tags.get(GPS_LATITUDE_REF)?;
    let lng = tags.get(GPS_LONGITUDE)?;
    let lng_ref = tags.get(GPS_LONGITUDE_REF)?;

    Some((
        to_degrees(&lat.numbers, &lat_ref.text)?,
        to_degrees(&lng.numbers, &lng_ref.text)?,
    ))
}

fn to_degrees(dms: &[f64], reference: &str) -> Option<f64> {
    let &[d, m, s] = dms else {
        return None;
    };
    let sign = if matches!(reference.trim(), "S" | "W") { -1.0 } else { 1.0 };
    Some(sign * (d + m / 60.0 + s / 3600.0))
}

/// `2000:01:01 12:34:56` becomes `2000-01-01T12:34:56Z`. The camera clock
/// carries no zone, so UTC is assumed.
pub fn capture_iso8601(tags: &ExifTags) -> Option<String> {
    let raw = tags.get(DATE_TIME_ORIGINAL)?.text.trim();
    if raw.is_empty() {
        return None;
    }
    Some(format!("{}Z", raw.replacen(':', "-", 2).replacen(' ', "T", 1)))
}
