use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::DomainError;

const MAX_TOPIC_LEN: usize = 64;

/// Name of a disease topic. Also used as the on-disk directory and the
/// collection name of the topic's index, so only a conservative character
/// set is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(DomainError::validation("topic name must not be empty"));
        }
        if trimmed.len() > MAX_TOPIC_LEN {
            return Err(DomainError::validation(format!(
                "topic name '{trimmed}' exceeds {MAX_TOPIC_LEN} characters"
            )));
        }
        if trimmed.starts_with(['.', '-']) {
            return Err(DomainError::validation(format!(
                "topic name '{trimmed}' must start with a letter, digit or underscore"
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(DomainError::validation(format!(
                "topic name '{trimmed}' contains invalid character '{bad}'"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Topic {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
