//! Job identifiers.
//!
//! # ID の方針
//! - クライアントが指定した文字列をそのまま使える（冪等な再投入のため）
//! - 指定がなければ `IdGenerator` が ULID ベースで生成する（`job-<ULID>`）
//!
//! ULID は時刻でソート可能で、複数ノードから調整なしに生成できます。

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::errors::ValidationError;

/// Maximum accepted length of a client-supplied job id.
pub const MAX_JOB_ID_LEN: usize = 128;

const GENERATED_PREFIX: &str = "job-";

/// Identifier of a job (submit / status unit).
///
/// Immutable once the record exists. Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validate a client-supplied identifier.
    ///
    /// Ids travel in URL paths, so whitespace, control characters and the
    /// `/`, `?`, `#` delimiters are rejected.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        if raw.chars().count() > MAX_JOB_ID_LEN {
            return Err(ValidationError::new(
                "id",
                format!("must be at most {MAX_JOB_ID_LEN} characters"),
            ));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#'))
        {
            return Err(ValidationError::new(
                "id",
                format!("contains forbidden character {bad:?}"),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build the generated form `job-<ULID>`.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{GENERATED_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ULID part of a generated id, if this id was generated.
    pub fn as_ulid(&self) -> Option<Ulid> {
        self.0
            .strip_prefix(GENERATED_PREFIX)
            .and_then(|s| Ulid::from_string(s).ok())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
