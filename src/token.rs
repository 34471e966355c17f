use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default characters-per-token ratio for plain text.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Estimates the token cost of text under some cost model.
///
/// Implementations must be deterministic, side-effect free and monotonic: a
/// string never costs less than any of its prefixes. Callers hold estimators as
/// `Arc<dyn TokenEstimator>`, so a precise tokenizer can replace the default
/// ratio model without touching any caller.
pub trait TokenEstimator: Send + Sync + fmt::Debug {
    /// Estimate the token count of `text`. Empty input costs 0.
    fn estimate(&self, text: &str) -> usize;

    /// Estimate the token count of structured content, as it would be
    /// serialized for the consumer.
    ///
    /// JSON `null` is rejected with [`Error::InvalidInput`] instead of being
    /// coerced to an empty string.
    fn estimate_value(&self, value: &Value) -> Result<usize> {
        match value {
            Value::Null => Err(Error::InvalidInput(
                "cannot estimate tokens of null content".to_string(),
            )),
            Value::String(s) => Ok(self.estimate(s)),
            other => Ok(self.estimate(&other.to_string())),
        }
    }
}

/// Kind of content, used to pick a characters-per-token ratio.
///
/// Symbol-dense content (code, JSON, XML) tokenizes into more tokens per
/// character than prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Code,
    Markdown,
    PlainText,
    Json,
    Yaml,
    Xml,
}

impl ContentKind {
    pub fn chars_per_token(self) -> f64 {
        match self {
            ContentKind::Code => 3.2,
            ContentKind::Markdown => 3.8,
            ContentKind::PlainText => 4.0,
            ContentKind::Json => 3.0,
            ContentKind::Yaml => 3.5,
            ContentKind::Xml => 2.8,
        }
    }
}

/// Fixed characters-per-token cost model, rounded up.
///
/// # Examples
///
/// ```
/// use codepager::{CharRatioEstimator, TokenEstimator};
///
/// let estimator = CharRatioEstimator::try_new(4.0).unwrap();
/// assert_eq!(estimator.estimate(""), 0);
/// assert_eq!(estimator.estimate("a"), 1);
/// assert_eq!(estimator.estimate("abcd"), 1);
/// assert_eq!(estimator.estimate("abcde"), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl CharRatioEstimator {
    /// Create an estimator with the given ratio.
    ///
    /// The ratio must be a finite number greater than zero.
    pub fn try_new(chars_per_token: f64) -> Result<Self> {
        if !chars_per_token.is_finite() || chars_per_token <= 0.0 {
            return Err(Error::Configuration(format!(
                "chars_per_token must be a positive number, got {}",
                chars_per_token
            )));
        }
        Ok(Self { chars_per_token })
    }

    /// Estimator tuned for a kind of content.
    pub fn for_kind(kind: ContentKind) -> Self {
        Self {
            chars_per_token: kind.chars_per_token(),
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        ((chars / self.chars_per_token).ceil() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_and_minimum() {
        let estimator = CharRatioEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate(" "), 1);

        // A huge ratio still yields at least one token for non-empty text
        let sparse = CharRatioEstimator::try_new(1_000_000.0).unwrap();
        assert_eq!(sparse.estimate("fn main() {}"), 1);
    }

    #[test]
    fn test_rounds_up() {
        let estimator = CharRatioEstimator::try_new(3.0).unwrap();
        assert_eq!(estimator.estimate("abc"), 1);
        assert_eq!(estimator.estimate("abcd"), 2);
        assert_eq!(estimator.estimate("abcdef"), 2);
        assert_eq!(estimator.estimate("abcdefg"), 3);
    }

    #[test]
    fn test_monotonic_over_prefixes() {
        let estimator = CharRatioEstimator::for_kind(ContentKind::Code);
        let text = "pub fn estimate(&self, text: &str) -> usize { text.len() }";
        let mut previous = 0;
        for end in 0..=text.len() {
            let current = estimator.estimate(&text[..end]);
            assert!(current >= previous, "estimate shrank at prefix {}", end);
            previous = current;
        }
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let estimator = CharRatioEstimator::try_new(1.0).unwrap();
        assert_eq!(estimator.estimate("héllo"), 5);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        for ratio in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                CharRatioEstimator::try_new(ratio),
                Err(Error::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_estimate_value() {
        let estimator = CharRatioEstimator::try_new(1.0).unwrap();
        assert_eq!(estimator.estimate_value(&json!("abc")).unwrap(), 3);
        // {"a":1} serializes to 7 chars
        assert_eq!(estimator.estimate_value(&json!({"a": 1})).unwrap(), 7);
        assert!(matches!(
            estimator.estimate_value(&Value::Null),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_content_kind_ratios() {
        let code = CharRatioEstimator::for_kind(ContentKind::Code);
        let prose = CharRatioEstimator::for_kind(ContentKind::PlainText);
        let text = "x".repeat(400);
        assert!(code.estimate(&text) > prose.estimate(&text));
        assert_eq!(prose.estimate(&text), 100);
    }
}
