//! Job identifiers.
//!
//! # JobId の構成
//! `{created}.{ulid}` の 2 フィールドで、そのままファイル名の先頭になります。
//! - **created**: UTC の作成時刻（秒単位、`%Y-%m-%d_%H-%M-%S`）
//! - **ulid**: 同じ秒の中での衝突を防ぐ suffix（単調増加 generator から取得）
//!
//! 派生した `Ord` は `(created, ulid)` の順に比較するので、
//! ソートするとそのまま作成順になります。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Timestamp format used for every timestamp embedded in a record name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Format a timestamp the way it appears inside record names.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a record-name timestamp back into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id '{0}'")]
pub struct InvalidJobId(pub String);

/// Identifier of a Job: creation time plus a ULID suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId {
    created: DateTime<Utc>,
    ulid: Ulid,
}

impl JobId {
    /// `created` is truncated to whole seconds so that the id survives a
    /// round trip through its file-name form.
    pub fn new(created: DateTime<Utc>, ulid: Ulid) -> Self {
        Self {
            created: created.trunc_subsecs(0),
            ulid,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", format_timestamp(&self.created), self.ulid)
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidJobId(s.to_string());
        let (created, suffix) = s.split_once('.').ok_or_else(invalid)?;
        let created = parse_timestamp(created).ok_or_else(invalid)?;
        let ulid = Ulid::from_string(suffix).map_err(|_| invalid())?;
        Ok(Self::new(created, ulid))
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}
