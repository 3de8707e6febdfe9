//! Protocol error set with stable numeric codes.
//!
//! Codes are part of the wire contract: HTTP error payloads and peers rely on
//! them staying put, so variants are never renumbered. Code 117 is
//! historically unassigned.

use serde::Serialize;

/// All protocol-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("already exists in block")]
    BlockAlreadyExists,
    #[error("`hash` does not match")]
    HashDoesNotMatch,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("failed to parse public address")]
    BadPublicAddress,
    #[error("invalid fee")]
    InvalidFee,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("received new, but known message")]
    NewButKnownMessage,
    #[error("found invalid state: {0}")]
    InvalidState(String),
    #[error("invalid voting threshold policy")]
    InvalidVotingThresholdPolicy,
    #[error("init state ballot does not have `message`")]
    BallotEmptyMessage,
    #[error("invalid `hash`")]
    InvalidHash,
    #[error("invalid `message`")]
    InvalidMessage,
    #[error("non-init state ballot must not have `message`")]
    BallotHasMessage,
    #[error("`VotingResult` already exists")]
    VotingResultAlreadyExists,
    #[error("`VotingResult` not found")]
    VotingResultNotFound,
    #[error("failed to set the new state to `VotingResult`")]
    VotingResultFailedToSetState,
    #[error("ballot is not in the voting box")]
    VotingResultNotInBox,
    #[error("ballot has no voting hole")]
    BallotNoVoting,
    #[error("ballot has no `node_key`")]
    BallotNoNodeKey,
    #[error("invalid validators")]
    VotingThresholdInvalidValidators,
    #[error("ballot has invalid state")]
    BallotHasInvalidState,
    #[error("failed to close `VotingResult`")]
    VotingResultFailedToClose,
    #[error("operations needed in transaction")]
    TransactionEmptyOperations,
    #[error("already saved")]
    AlreadySaved,
    #[error("duplicated operations in transaction")]
    DuplicatedOperation,
    #[error("unknown operation type")]
    UnknownOperationType,
    #[error("operation type and its body do not match")]
    TypeOperationBodyNotMatched,
    #[error("account does not exist in block")]
    BlockAccountDoesNotExists,
    #[error("account already exists in block")]
    BlockAccountAlreadyExists,
    #[error("account balance would be under zero")]
    AccountBalanceUnderZero,
    #[error("monetary amount would be greater than the total supply of coins")]
    MaximumBalanceReached,
    #[error("record does not exist in storage")]
    StorageRecordDoesNotExist,
    #[error("invalid checkpoint found")]
    TransactionInvalidCheckpoint,
    #[error("transaction does not exist in block")]
    BlockTransactionDoesNotExists,
    #[error("operation does not exist in block")]
    BlockOperationDoesNotExists,
}

impl Error {
    /// Stable numeric code for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::BlockAlreadyExists => 100,
            Error::HashDoesNotMatch => 101,
            Error::SignatureVerificationFailed => 102,
            Error::BadPublicAddress => 103,
            Error::InvalidFee => 104,
            Error::InvalidOperation => 105,
            Error::NewButKnownMessage => 106,
            Error::InvalidState(_) => 107,
            Error::InvalidVotingThresholdPolicy => 108,
            Error::BallotEmptyMessage => 109,
            Error::InvalidHash => 110,
            Error::InvalidMessage => 111,
            Error::BallotHasMessage => 112,
            Error::VotingResultAlreadyExists => 113,
            Error::VotingResultNotFound => 114,
            Error::VotingResultFailedToSetState => 115,
            Error::VotingResultNotInBox => 116,
            Error::BallotNoVoting => 118,
            Error::BallotNoNodeKey => 119,
            Error::VotingThresholdInvalidValidators => 120,
            Error::BallotHasInvalidState => 121,
            Error::VotingResultFailedToClose => 122,
            Error::TransactionEmptyOperations => 123,
            Error::AlreadySaved => 124,
            Error::DuplicatedOperation => 125,
            Error::UnknownOperationType => 126,
            Error::TypeOperationBodyNotMatched => 127,
            Error::BlockAccountDoesNotExists => 128,
            Error::BlockAccountAlreadyExists => 129,
            Error::AccountBalanceUnderZero => 130,
            Error::MaximumBalanceReached => 131,
            Error::StorageRecordDoesNotExist => 132,
            Error::TransactionInvalidCheckpoint => 133,
            Error::BlockTransactionDoesNotExists => 134,
            Error::BlockOperationDoesNotExists => 135,
        }
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Error", 2)?;
        s.serialize_field("code", &self.code())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::BlockAlreadyExists.code(), 100);
        assert_eq!(Error::NewButKnownMessage.code(), 106);
        assert_eq!(Error::VotingResultNotInBox.code(), 116);
        // 117 was never assigned
        assert_eq!(Error::BallotNoVoting.code(), 118);
        assert_eq!(Error::AlreadySaved.code(), 124);
        assert_eq!(Error::BlockOperationDoesNotExists.code(), 135);
    }

    #[test]
    fn serializes_as_code_and_message() {
        let v = serde_json::to_value(Error::AlreadySaved).unwrap();
        assert_eq!(v["code"], 124);
        assert_eq!(v["message"], "already saved");
    }
}
