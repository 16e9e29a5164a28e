use crate::error::AppError;
use async_trait::async_trait;
use std::path::Path;

/// What a classifier hands back: a closed-set model answers with tags, a
/// generative one with free text that still has to go through extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Tags(Vec<String>),
    Text(String),
}

/// Image-to-description capability. Implementations are loaded once and
/// borrowed by the indexer for a whole pass; calls are never overlapped.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(
        &self,
        path: &Path,
        location_hint: Option<&str>,
    ) -> Result<Prediction, AppError>;
}
