pub mod command;
pub mod generative;

use crate::classifier::Classifier;
use crate::config::ClassifierConfig;
use crate::error::AppError;
use command::CommandClassifier;
use generative::GenerativeCaptioner;

pub fn from_config(config: &ClassifierConfig) -> Result<Box<dyn Classifier>, AppError> {
    match config.kind.as_str() {
        "generative" => Ok(Box::new(GenerativeCaptioner::new(config)?)),
        "command" => {
            let command = config.command.as_deref().ok_or_else(|| {
                AppError::Generic("classifier.kind = \"command\" needs classifier.command".into())
            })?;
            Ok(Box::new(CommandClassifier::new(command)?))
        }
        other => Err(AppError::Generic(format!("unknown classifier kind: {other}"))),
    }
}
