use crate::{Error, Result, StrategyKind, StrategyState};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Version of the continuation token layout.
pub const CONTEXT_VERSION: u32 = 1;

/// Tokens longer than this are rejected before decoding.
pub const MAX_TOKEN_LEN: usize = 8192;

const TAG_LEN: usize = 8;

/// Position of a caller inside a paginated run.
///
/// The engine keeps no state between calls: the caller holds the context as
/// an opaque token and presents it to get the next page. A context is only
/// valid for the run and strategy it was created for.
///
/// The wire form is URL-safe base64 of an 8-byte integrity tag followed by
/// the JSON body. The tag is a SHA-256 prefix of the body, keyed by an
/// optional shared secret; any change to the token is detected on decode.
///
/// # Examples
///
/// ```
/// use codepager::{PaginationContext, StrategyKind};
///
/// let context = PaginationContext::start("run-1", StrategyKind::Smart, 4000);
/// let token = context.encode(Some("secret")).unwrap();
///
/// let decoded = PaginationContext::decode(&token, Some("secret")).unwrap();
/// assert_eq!(decoded, context);
/// assert!(PaginationContext::decode(&token, Some("other")).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationContext {
    #[serde(rename = "v")]
    pub version: u32,
    pub run_id: String,
    pub strategy: StrategyKind,
    pub token_budget: usize,
    /// First ordinal not yet paged
    pub next_ordinal: usize,
    /// Sequence number of the next chunk
    pub sequence: usize,
    /// Failed units dropped so far
    pub skipped_failures: usize,
    #[serde(default)]
    pub strategy_state: StrategyState,
    /// Set once the final chunk has been produced
    #[serde(default)]
    pub terminal: bool,
}

impl PaginationContext {
    /// Context of a first page.
    pub fn start(run_id: impl Into<String>, strategy: StrategyKind, token_budget: usize) -> Self {
        Self {
            version: CONTEXT_VERSION,
            run_id: run_id.into(),
            strategy,
            token_budget,
            next_ordinal: 0,
            sequence: 0,
            skipped_failures: 0,
            strategy_state: StrategyState::default(),
            terminal: false,
        }
    }

    pub fn encode(&self, secret: Option<&str>) -> Result<String> {
        let body = serde_json::to_vec(self)?;
        let mut bytes = tag(secret, &body).to_vec();
        bytes.extend_from_slice(&body);

        let token = URL_SAFE_NO_PAD.encode(bytes);
        if token.len() > MAX_TOKEN_LEN {
            return Err(Error::InvalidContext(format!(
                "encoded context is {} characters, limit is {}",
                token.len(),
                MAX_TOKEN_LEN
            )));
        }
        Ok(token)
    }

    pub fn decode(token: &str, secret: Option<&str>) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(invalid("empty token"));
        }
        if token.len() > MAX_TOKEN_LEN {
            return Err(invalid("token too long"));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| invalid(&format!("not base64: {e}")))?;
        if bytes.len() <= TAG_LEN {
            return Err(invalid("token truncated"));
        }
        let (expected, body) = bytes.split_at(TAG_LEN);
        if tag(secret, body) != expected {
            return Err(invalid("checksum mismatch"));
        }

        let value: Value =
            serde_json::from_slice(body).map_err(|e| invalid(&format!("bad body: {e}")))?;
        match value.get("v").and_then(Value::as_u64) {
            Some(v) if v == u64::from(CONTEXT_VERSION) => {}
            Some(v) => return Err(invalid(&format!("unsupported version {v}"))),
            None => return Err(invalid("missing version")),
        }
        serde_json::from_value(value).map_err(|e| invalid(&format!("bad body: {e}")))
    }

    /// Fail with [`Error::ContextMismatch`] unless the context was created for
    /// this run and strategy.
    pub fn ensure_matches(&self, run_id: &str, strategy: StrategyKind) -> Result<()> {
        if self.run_id != run_id {
            return Err(Error::ContextMismatch(format!(
                "token belongs to run {}, not {}",
                self.run_id, run_id
            )));
        }
        if self.strategy != strategy {
            return Err(Error::ContextMismatch(format!(
                "token was created for strategy {}, not {}",
                self.strategy, strategy
            )));
        }
        Ok(())
    }
}

fn tag(secret: Option<&str>, body: &[u8]) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    if let Some(secret) = secret {
        hasher.update((secret.len() as u64).to_le_bytes());
        hasher.update(secret.as_bytes());
    }
    hasher.update(body);
    let digest = hasher.finalize();

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

fn invalid(reason: &str) -> Error {
    Error::InvalidContext(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PaginationContext {
        PaginationContext {
            next_ordinal: 7,
            sequence: 2,
            skipped_failures: 1,
            strategy_state: StrategyState {
                open_group: Some("src".to_string()),
            },
            ..PaginationContext::start("run-1", StrategyKind::Smart, 20)
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = context().encode(None).unwrap();
        let b = context().encode(None).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains('='));
        assert_eq!(PaginationContext::decode(&a, None).unwrap(), context());
    }

    #[test]
    fn test_tampered_tokens_are_invalid() {
        let token = context().encode(None).unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        let flipped = URL_SAFE_NO_PAD.encode(&bytes);

        for bad in [
            flipped.as_str(),
            &token[..token.len() / 2],
            "",
            "%%%not-base64%%%",
            "AAAA",
        ] {
            assert!(
                matches!(PaginationContext::decode(bad, None), Err(Error::InvalidContext(_))),
                "accepted {bad:?}"
            );
        }

        let long = "A".repeat(MAX_TOKEN_LEN + 1);
        assert!(matches!(
            PaginationContext::decode(&long, None),
            Err(Error::InvalidContext(_))
        ));
    }

    #[test]
    fn test_secret_is_part_of_the_tag() {
        let token = context().encode(Some("k1")).unwrap();
        assert!(PaginationContext::decode(&token, Some("k1")).is_ok());
        assert!(matches!(
            PaginationContext::decode(&token, Some("k2")),
            Err(Error::InvalidContext(_))
        ));
        assert!(matches!(
            PaginationContext::decode(&token, None),
            Err(Error::InvalidContext(_))
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut future = context();
        future.version = CONTEXT_VERSION + 1;
        let token = future.encode(None).unwrap();
        let err = PaginationContext::decode(&token, None).unwrap_err();
        assert!(matches!(err, Error::InvalidContext(ref m) if m.contains("version")));
    }

    #[test]
    fn test_mismatch() {
        let context = context();
        assert!(context.ensure_matches("run-1", StrategyKind::Smart).is_ok());
        assert!(matches!(
            context.ensure_matches("run-2", StrategyKind::Smart),
            Err(Error::ContextMismatch(_))
        ));
        assert!(matches!(
            context.ensure_matches("run-1", StrategyKind::FileByFile),
            Err(Error::ContextMismatch(_))
        ));
    }
}
