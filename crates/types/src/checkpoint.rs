//! Account checkpoints.
//!
//! A checkpoint is the pair `"<subtracted>-<added>"`: the hash of the last
//! transaction that withdrew from the account and the hash of the last one
//! that deposited into it. It is the anti-replay and per-account ordering
//! primitive. Initial checkpoints are arbitrary agreed strings (UUIDs by
//! convention), so parsing splits at the first dash only.

use crate::Error;

/// A parsed `(subtracted, added)` checkpoint pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub subtracted: String,
    pub added: String,
}

impl Checkpoint {
    /// Compose the serialized form from the two halves.
    pub fn compose(subtracted: &str, added: &str) -> String {
        format!("{}-{}", subtracted, added)
    }

    /// Split a serialized checkpoint at the first dash.
    pub fn parse(s: &str) -> Result<Checkpoint, Error> {
        let (subtracted, added) = s
            .split_once('-')
            .ok_or(Error::TransactionInvalidCheckpoint)?;
        if subtracted.is_empty() || added.is_empty() {
            return Err(Error::TransactionInvalidCheckpoint);
        }
        Ok(Checkpoint {
            subtracted: subtracted.to_string(),
            added: added.to_string(),
        })
    }
}

/// Whether two serialized checkpoints share the same `subtracted` half.
///
/// A transaction is valid against a source account iff this holds between
/// the transaction's checkpoint and the account's current one. Exact string
/// equality short-circuits so pre-parse initial checkpoints compare too.
pub fn same_origin(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (Checkpoint::parse(a), Checkpoint::parse(b)) {
        (Ok(a), Ok(b)) => a.subtracted == b.subtracted,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_parse_round_trip() {
        let s = Checkpoint::compose("abc", "def");
        assert_eq!(s, "abc-def");
        let cp = Checkpoint::parse(&s).unwrap();
        assert_eq!(cp.subtracted, "abc");
        assert_eq!(cp.added, "def");
    }

    #[test]
    fn parse_splits_at_first_dash_only() {
        // UUID initial checkpoints contain many dashes
        let uuid = uuid::Uuid::new_v4().to_string();
        let cp = Checkpoint::parse(&uuid).unwrap();
        assert_eq!(
            Checkpoint::compose(&cp.subtracted, &cp.added),
            uuid
        );
    }

    #[test]
    fn parse_rejects_dashless_and_empty_halves() {
        assert_eq!(
            Checkpoint::parse("nodash"),
            Err(Error::TransactionInvalidCheckpoint)
        );
        assert_eq!(
            Checkpoint::parse("-tail"),
            Err(Error::TransactionInvalidCheckpoint)
        );
        assert_eq!(
            Checkpoint::parse(""),
            Err(Error::TransactionInvalidCheckpoint)
        );
    }

    #[test]
    fn same_origin_matches_subtracted_half() {
        assert!(same_origin("h1-h1", "h1-h2"));
        assert!(same_origin("u-u", "u-u"));
        assert!(!same_origin("h1-h2", "h3-h2"));
        assert!(!same_origin("plain", "other"));
        // identical opaque strings match even if unparseable
        assert!(same_origin("plain", "plain"));
    }
}
