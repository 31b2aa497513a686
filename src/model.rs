//! Core data model.
//!
//! A queue is a named triple of ordered sequences (queued, pending, done).
//! An item is an opaque byte string whose content is its identity; two
//! items with the same bytes are indistinguishable, and every state-changing
//! operation acts on at most one matching occurrence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Remove embedded line breaks and reject what is left if empty.
fn sanitize(kind: &str, raw: &str) -> Result<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
    if cleaned.is_empty() {
        return Err(Error::Invalid(format!("{kind} is empty")));
    }
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Validated queue identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueId(String);

impl QueueId {
    /// Sanitize and validate a raw identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        sanitize("queue id", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for QueueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QueueId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<QueueId> for String {
    fn from(id: QueueId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// An opaque work item. Content is identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item(Vec<u8>);

impl Item {
    /// Sanitize and validate a textual item.
    pub fn parse(raw: &str) -> Result<Self> {
        sanitize("item", raw).map(|s| Self(s.into_bytes()))
    }

    /// Wrap raw bytes. Line-break bytes are stripped like [`Item::parse`].
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let mut bytes = bytes.into();
        bytes.retain(|b| !matches!(b, b'\n' | b'\r'));
        if bytes.is_empty() {
            return Err(Error::Invalid("item is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for Item {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

impl std::str::FromStr for Item {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// Opaque name of the worker that took a lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Holder(String);

impl Holder {
    pub fn parse(raw: &str) -> Result<Self> {
        sanitize("holder", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Holder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Time-bounded claim on a pending item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub queue: QueueId,
    pub item: Item,
    pub holder: Holder,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// An expired lease is treated exactly like an absent one.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Remaining time until expiry, or `None` once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

// ---------------------------------------------------------------------------
// Sequences + status
// ---------------------------------------------------------------------------

/// The three ordered sequences every queue owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    Queued,
    Pending,
    Done,
}

impl Sequence {
    pub fn as_str(self) -> &'static str {
        match self {
            Sequence::Queued => "queued",
            Sequence::Pending => "pending",
            Sequence::Done => "done",
        }
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Sequence::Queued),
            "pending" => Ok(Sequence::Pending),
            "done" => Ok(Sequence::Done),
            other => Err(Error::Invalid(format!("unknown sequence: {other}"))),
        }
    }
}

/// Sequence lengths of one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub queued: u64,
    pub pending: u64,
    pub done: u64,
    pub total: u64,
}

impl Summary {
    pub fn new(queued: u64, pending: u64, done: u64) -> Self {
        Self {
            queued,
            pending,
            done,
            total: queued + pending + done,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Done: {}. Pending: {}. Queued: {}. All: {}.",
            self.done, self.pending, self.queued, self.total
        )
    }
}

/// One pending item with whatever is known about its lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDetail {
    pub item: Item,
    /// `None` when the lease is absent or its lookup failed.
    pub holder: Option<Holder>,
    pub ttl: Option<Duration>,
}

impl PendingDetail {
    /// Remaining lease time in whole seconds, `-1` when unknown.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl.map_or(-1, |d| d.as_secs() as i64)
    }
}

impl std::fmt::Display for PendingDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let holder = self.holder.as_ref().map_or("unknown", |h| h.as_str());
        write!(f, "{}\t{}\t{}", self.item, holder, self.ttl_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn queue_id_strips_line_breaks() {
        let id = QueueId::parse("jo\r\nbs\n").unwrap();
        assert_eq!(id.as_str(), "jobs");
    }

    #[test]
    fn empty_after_sanitizing_is_invalid() {
        assert!(matches!(QueueId::parse("\r\n"), Err(Error::Invalid(_))));
        assert!(matches!(Item::parse(""), Err(Error::Invalid(_))));
        assert!(matches!(Item::from_bytes(b"\n".to_vec()), Err(Error::Invalid(_))));
        assert!(matches!(Holder::parse("\n"), Err(Error::Invalid(_))));
    }

    #[test]
    fn item_bytes_keep_everything_but_line_breaks() {
        let item = Item::from_bytes(vec![0u8, b'\n', 0xff]).unwrap();
        assert_eq!(item.as_bytes(), &[0u8, 0xff]);
    }

    #[test]
    fn summary_display_matches_status_line() {
        let summary = Summary::new(4, 1, 2);
        assert_eq!(summary.total, 7);
        assert_eq!(summary.to_string(), "Done: 2. Pending: 1. Queued: 4. All: 7.");
    }

    #[test]
    fn expired_lease_has_no_remaining_time() {
        let now = Utc::now();
        let lease = Lease {
            queue: QueueId::parse("q").unwrap(),
            item: Item::parse("a").unwrap(),
            holder: Holder::parse("w").unwrap(),
            expires_at: now,
        };
        assert!(!lease.is_active(now));
        assert_eq!(lease.remaining(now), None);
        assert_eq!(
            lease.remaining(now - TimeDelta::seconds(30)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn pending_detail_degrades_to_unknown() {
        let detail = PendingDetail {
            item: Item::parse("x1").unwrap(),
            holder: None,
            ttl: None,
        };
        assert_eq!(detail.to_string(), "x1\tunknown\t-1");
    }

    #[test]
    fn sequence_round_trips_through_str() {
        for seq in [Sequence::Queued, Sequence::Pending, Sequence::Done] {
            assert_eq!(seq.as_str().parse::<Sequence>().unwrap(), seq);
        }
    }
}
