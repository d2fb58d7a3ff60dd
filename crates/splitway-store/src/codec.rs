//! Key encoding for metric storage.
//!
//! Key formats:
//! - `metric::<app>::<track>::<signature>::<metric>::<user>::<transaction>`
//! - `users::<app>::<track>::<signature>::<user>`
//! - `result::<namespace>::<experiment>`
//!
//! Keys sort by metric, then user, then transaction within one
//! (app, track, signature) prefix. The aggregation scan depends on that order.

use splitway_core::{Signature, Track};

use crate::error::{StoreError, StoreResult};

/// Leading token of per-transaction metric keys.
pub const METRIC_PREFIX: &str = "metric";
/// Leading token of user presence keys.
pub const USER_PREFIX: &str = "users";
/// Leading token of experiment result keys.
pub const RESULT_PREFIX: &str = "result";
/// Separator between key tokens.
pub const DELIMITER: &str = "::";

const METRIC_KEY_TOKENS: usize = 7;
const USER_KEY_TOKENS: usize = 5;

/// Builds prefixes for range scans and validates key tokens.
pub struct KeyCodec;

impl KeyCodec {
    /// Reject tokens that are empty or contain the delimiter character.
    pub fn validate_token(field: &str, token: &str) -> StoreResult<()> {
        if token.is_empty() {
            return Err(StoreError::Encoding(format!("{field} must not be empty")));
        }
        if token.contains(':') {
            return Err(StoreError::Encoding(format!(
                "{field} '{token}' must not contain ':'"
            )));
        }
        Ok(())
    }

    /// Prefix shared by every metric key of one track generation.
    ///
    /// Format: `metric::<app>::<track>::<signature>::`
    pub fn metric_key_prefix(app: &str, track: Track, signature: &Signature) -> StoreResult<String> {
        Self::validate_token("application", app)?;
        Self::validate_token("signature", signature.as_str())?;
        Ok(format!(
            "{METRIC_PREFIX}{DELIMITER}{app}{DELIMITER}{track}{DELIMITER}{signature}{DELIMITER}"
        ))
    }

    /// Prefix shared by every user key of one track generation.
    ///
    /// Format: `users::<app>::<track>::<signature>::`
    pub fn user_key_prefix(app: &str, track: Track, signature: &Signature) -> StoreResult<String> {
        Self::validate_token("application", app)?;
        Self::validate_token("signature", signature.as_str())?;
        Ok(format!(
            "{USER_PREFIX}{DELIMITER}{app}{DELIMITER}{track}{DELIMITER}{signature}{DELIMITER}"
        ))
    }

    /// Format: `result::<namespace>::<experiment>`
    pub fn result_key(namespace: &str, experiment: &str) -> StoreResult<String> {
        Self::validate_token("namespace", namespace)?;
        Self::validate_token("experiment", experiment)?;
        Ok(format!("{RESULT_PREFIX}{DELIMITER}{namespace}{DELIMITER}{experiment}"))
    }

    fn split<'a>(key: &'a str, expected: usize, prefix: &str) -> StoreResult<Vec<&'a str>> {
        let tokens: Vec<&str> = key.split(DELIMITER).collect();
        if tokens.len() != expected {
            return Err(StoreError::Encoding(format!(
                "key '{key}' has {} tokens, expected {expected}",
                tokens.len()
            )));
        }
        if tokens[0] != prefix {
            return Err(StoreError::Encoding(format!(
                "key '{key}' does not start with '{prefix}'"
            )));
        }
        Ok(tokens)
    }

    fn parse_track(key: &str, token: &str) -> StoreResult<Track> {
        token
            .parse::<u32>()
            .map(Track::new)
            .map_err(|_| StoreError::Encoding(format!("key '{key}' has invalid track '{token}'")))
    }
}

/// One recorded metric value for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricKey {
    pub app: String,
    pub track: Track,
    pub signature: Signature,
    pub metric: String,
    pub user: String,
    pub transaction: String,
}

impl MetricKey {
    pub fn encode(&self) -> StoreResult<String> {
        KeyCodec::validate_token("metric", &self.metric)?;
        KeyCodec::validate_token("user", &self.user)?;
        KeyCodec::validate_token("transaction", &self.transaction)?;
        let prefix = KeyCodec::metric_key_prefix(&self.app, self.track, &self.signature)?;
        Ok(format!(
            "{prefix}{}{DELIMITER}{}{DELIMITER}{}",
            self.metric, self.user, self.transaction
        ))
    }

    pub fn parse(key: &str) -> StoreResult<Self> {
        let tokens = KeyCodec::split(key, METRIC_KEY_TOKENS, METRIC_PREFIX)?;
        Ok(Self {
            app: tokens[1].to_string(),
            track: KeyCodec::parse_track(key, tokens[2])?,
            signature: Signature::new(tokens[3]),
            metric: tokens[4].to_string(),
            user: tokens[5].to_string(),
            transaction: tokens[6].to_string(),
        })
    }

    /// Presence key of the user who produced this metric.
    pub fn user_key(&self) -> UserKey {
        UserKey {
            app: self.app.clone(),
            track: self.track,
            signature: self.signature.clone(),
            user: self.user.clone(),
        }
    }
}

/// Marks a user as having been routed to a track generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKey {
    pub app: String,
    pub track: Track,
    pub signature: Signature,
    pub user: String,
}

impl UserKey {
    pub fn encode(&self) -> StoreResult<String> {
        KeyCodec::validate_token("user", &self.user)?;
        let prefix = KeyCodec::user_key_prefix(&self.app, self.track, &self.signature)?;
        Ok(format!("{prefix}{}", self.user))
    }

    pub fn parse(key: &str) -> StoreResult<Self> {
        let tokens = KeyCodec::split(key, USER_KEY_TOKENS, USER_PREFIX)?;
        Ok(Self {
            app: tokens[1].to_string(),
            track: KeyCodec::parse_track(key, tokens[2])?,
            signature: Signature::new(tokens[3]),
            user: tokens[4].to_string(),
        })
    }
}
