use crate::error::AppError;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geocode {
    pub city: String,
    pub state: String,
    pub country: String,
    pub country_code: String,
}

impl Geocode {
    /// One component per line, city first. This is the text stored in the
    /// searchable `geocode` column.
    pub fn flatten(&self) -> String {
        [&self.city, &self.state, &self.country, &self.country_code]
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Location hint handed to the classifier prompt.
    pub fn hint(&self) -> String {
        [&self.city, &self.state, &self.country]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Place names counted in the tag table next to model tags.
    pub fn pseudo_tags(&self) -> [&str; 3] {
        [
            self.country.as_str(),
            self.city.as_str(),
            self.country_code.as_str(),
        ]
    }
}

pub trait ReverseGeocoder: Send + Sync {
    fn lookup(&self, lat_deg: f64, lng_deg: f64) -> Option<Geocode>;
}

/// Used when no places file is configured: every image gets an empty geocode.
pub struct NoGeocoder;

impl ReverseGeocoder for NoGeocoder {
    fn lookup(&self, _lat_deg: f64, _lng_deg: f64) -> Option<Geocode> {
        None
    }
}

struct Place {
    lat: f64,
    lng: f64,
    geocode: Geocode,
}

/// Offline nearest-place lookup over a tab-separated file with the columns
/// `lat lng city state country country_code`. Lines starting with `#` are
/// comments.
pub struct PlacesGeocoder {
    places: Vec<Place>,
}

impl PlacesGeocoder {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        log::info!("Loading places from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        let geocoder = Self::parse(&contents)?;
        log::info!("Loaded {} places", geocoder.places.len());
        Ok(geocoder)
    }

    pub fn parse(contents: &str) -> Result<Self, AppError> {
        let mut places = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 6 {
                return Err(AppError::Generic(format!(
                    "places line {}: expected 6 tab-separated columns, found {}",
                    line_no + 1,
                    cols.len()
                )));
            }
            let coord = |s: &str| {
                s.trim().parse::<f64>().map_err(|e| {
                    AppError::Generic(format!("places line {}: {}", line_no + 1, e))
                })
            };
            places.push(Place {
                lat: coord(cols[0])?,
                lng: coord(cols[1])?,
                geocode: Geocode {
                    city: cols[2].trim().to_string(),
                    state: cols[3].trim().to_string(),
                    country: cols[4].trim().to_string(),
                    country_code: cols[5].trim().to_string(),
                },
            });
        }
        Ok(Self { places })
    }
}

impl ReverseGeocoder for PlacesGeocoder {
    fn lookup(&self, lat_deg: f64, lng_deg: f64) -> Option<Geocode> {
        self.places
            .iter()
            .map(|p| (haversine_km(lat_deg, lng_deg, p.lat, p.lng), p))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(distance, p)| {
                log::trace!("Nearest place to ({}, {}) is {} at {:.1} km", lat_deg, lng_deg, p.geocode.city, distance);
                p.geocode.clone()
            })
    }
}

fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
