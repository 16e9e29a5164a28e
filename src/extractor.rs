//! Turns free-form model output into a validated [`Description`].
//!
//! Each attempt re-runs the full model call, so the attempt bound is also the
//! worst-case cost per image. When the bound is reached the image is indexed
//! with an empty description instead of failing the batch.

use crate::classifier::{Classifier, Prediction};
use crate::error::AppError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

pub const DEFAULT_MAX_ATTEMPTS: usize = 20;

pub const REQUIRED_FIELDS: [&str; 7] = [
    "identified_objects",
    "themes",
    "alt_text",
    "critique",
    "suggested_title",
    "composition_critique",
    "subject",
];

/// Fields that may arrive as a bare string and are wrapped into a list.
const LIST_FIELDS: [&str; 2] = ["identified_objects", "themes"];

lazy_static! {
    // First `{ ... }`, shortest match, spanning newlines.
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)\{.*?\}").expect("valid JSON block regex");
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Description {
    pub identified_objects: Vec<String>,
    pub themes: Vec<String>,
    pub alt_text: String,
    pub critique: String,
    pub suggested_title: String,
    pub composition_critique: String,
    pub subject: String,
}

impl Description {
    /// Raw tags: identified objects followed by themes.
    pub fn tags(&self) -> Vec<String> {
        self.identified_objects
            .iter()
            .chain(&self.themes)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no JSON object in response")]
    NoJsonBlock,

    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field types: {0}")]
    Invalid(serde_json::Error),
}

/// Locate the first JSON-looking object in `text` and validate it.
pub fn parse_response(text: &str) -> Result<Description, ExtractionError> {
    let block = JSON_BLOCK.find(text).ok_or(ExtractionError::NoJsonBlock)?;
    let mut value: Value = serde_json::from_str(block.as_str())?;

    if let Some(object) = value.as_object_mut() {
        for field in REQUIRED_FIELDS {
            if matches!(object.get(field), None | Some(Value::Null)) {
                return Err(ExtractionError::MissingField(field));
            }
        }
        for field in LIST_FIELDS {
            if let Some(Value::String(single)) = object.get(field) {
                let wrapped = Value::Array(vec![Value::String(single.clone())]);
                object.insert(field.to_string(), wrapped);
            }
        }
    }

    serde_json::from_value(value).map_err(ExtractionError::Invalid)
}

/// Result of running the extractor for one image.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// `None` for closed-set classifiers and for degraded images.
    pub description: Option<Description>,
    /// Raw, not yet normalized tags.
    pub tags: Vec<String>,
    /// The attempt budget ran out and the image carries no description.
    pub degraded: bool,
    pub attempts: usize,
    pub started: SystemTime,
    pub elapsed: Duration,
}

pub struct Extractor {
    max_attempts: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl Extractor {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    #[cfg(test)]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Ask `classifier` about `path` until a valid description comes back or
    /// the attempt budget is spent. Classifier errors (unreachable model,
    /// unreadable file) are not retried and propagate.
    pub async fn extract(
        &self,
        classifier: &dyn Classifier,
        path: &Path,
        location_hint: Option<&str>,
    ) -> Result<Extraction, AppError> {
        let started = SystemTime::now();
        let clock = Instant::now();
        let finish = |description: Option<Description>, tags, degraded, attempts| Extraction {
            description,
            tags,
            degraded,
            attempts,
            started,
            elapsed: clock.elapsed(),
        };

        for attempt in 1..=self.max_attempts {
            match classifier.predict(path, location_hint).await? {
                Prediction::Tags(tags) => return Ok(finish(None, tags, false, attempt)),
                Prediction::Text(text) => match parse_response(&text) {
                    Ok(description) => {
                        log::debug!("Extracted description for {:?} on attempt {}", path, attempt);
                        let tags = description.tags();
                        return Ok(finish(Some(description), tags, false, attempt));
                    }
                    Err(e) => {
                        log::warn!(
                            "Extraction attempt {}/{} for {:?} failed: {}",
                            attempt,
                            self.max_attempts,
                            path,
                            e
                        );
                        log::trace!("Unusable response: {}", text);
                    }
                },
            }
        }

        log::error!(
            "Giving up on {:?} after {} attempts, indexing it without a description",
            path,
            self.max_attempts
        );
        Ok(finish(None, Vec::new(), true, self.max_attempts))
    }
}
