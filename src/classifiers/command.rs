use crate::classifier::{Classifier, Prediction};
use crate::error::AppError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Closed-set classifier run as a child process, e.g. a small YOLO script.
///
/// The image path is appended to the command line; each non-empty stdout
/// line is one tag, best first. The location hint, when known, is exported
/// as `PHOTO_LOCATION_HINT`. The command line is split on whitespace, with
/// single or double quotes grouping words and `\` escaping one character.
/// No other shell syntax is interpreted.
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
}

impl CommandClassifier {
    pub fn new(command: &str) -> Result<Self, AppError> {
        let mut parts = split_command(command)?.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| AppError::Generic("empty classifier command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

fn split_command(command: &str) -> Result<Vec<String>, AppError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"') | None, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| AppError::Generic("classifier command ends with `\\`".into()))?;
                word.push(escaped);
                in_word = true;
            }
            (Some(_), c) => word.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            (None, c) => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(AppError::Generic(format!("unclosed {q} in classifier command")));
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn predict(
        &self,
        path: &Path,
        location_hint: Option<&str>,
    ) -> Result<Prediction, AppError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(hint) = location_hint {
            command.env("PHOTO_LOCATION_HINT", hint);
        }

        let output = command.output().await?;
        if !output.status.success() {
            return Err(AppError::Classifier(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let tags = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Prediction::Tags(tags))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandClassifier::new("   ").is_err());
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            split_command(r#"python3 "/opt/my models/tag.py" --labels 'coco v2' a\ b"#).unwrap(),
            vec!["python3", "/opt/my models/tag.py", "--labels", "coco v2", "a b"]
        );
        assert_eq!(split_command(r#"tag --sep "" x"#).unwrap(), vec!["tag", "--sep", "", "x"]);
        assert_eq!(split_command(r"tag 'a\b'").unwrap(), vec!["tag", r"a\b"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert!(split_command("tag 'coco").is_err());
        assert!(CommandClassifier::new(r#"tag "coco"#).is_err());
        assert!(split_command(r"tag \").is_err());
    }

    #[tokio::test]
    async fn stdout_lines_become_tags() {
        let classifier = CommandClassifier::new(r"printf '%s\n' spider_monkey milk_can").unwrap();
        let prediction = classifier
            .predict(Path::new("/photos/monkey.jpg"), None)
            .await
            .unwrap();

        assert_eq!(
            prediction,
            Prediction::Tags(vec![
                "spider_monkey".into(),
                "milk_can".into(),
                "/photos/monkey.jpg".into()
            ])
        );
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let classifier = CommandClassifier::new("false").unwrap();
        let err = classifier
            .predict(Path::new("/photos/monkey.jpg"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Classifier(_)));
    }
}
