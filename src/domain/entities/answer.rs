use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{RetrievedContext, Topic};
use crate::domain::errors::DomainError;

/// How strictly an answer must be derived from retrieved context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingMode {
    /// Answer only from context, otherwise refuse.
    #[default]
    Strict,
    /// Prefer context, fall back to the model's own knowledge.
    Open,
}

impl GroundingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for GroundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroundingMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "open" => Ok(Self::Open),
            other => Err(DomainError::validation(format!(
                "unknown grounding mode '{other}'"
            ))),
        }
    }
}

/// Where a piece of context came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub topic: Topic,
    pub chunk_index: usize,
    pub page: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub mode: GroundingMode,
    /// The answer is the fixed strict-mode refusal.
    pub refused: bool,
    pub sources: Vec<Source>,
}

impl Answer {
    pub fn refusal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: GroundingMode::Strict,
            refused: true,
            sources: Vec::new(),
        }
    }

    pub fn grounded(text: impl Into<String>, mode: GroundingMode, context: &RetrievedContext) -> Self {
        Self {
            text: text.into(),
            mode,
            refused: false,
            sources: context
                .results
                .iter()
                .map(|r| Source {
                    topic: r.chunk.topic.clone(),
                    chunk_index: r.chunk.chunk_index,
                    page: r.chunk.page,
                    score: r.score,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("STRICT".parse::<GroundingMode>().unwrap(), GroundingMode::Strict);
        assert_eq!(" open ".parse::<GroundingMode>().unwrap(), GroundingMode::Open);
        assert!("loose".parse::<GroundingMode>().is_err());
    }

    #[test]
    fn test_mode_default_is_strict() {
        assert_eq!(GroundingMode::default(), GroundingMode::Strict);
        let mode: GroundingMode = serde_json::from_str("\"open\"").unwrap();
        assert_eq!(mode, GroundingMode::Open);
    }
}
