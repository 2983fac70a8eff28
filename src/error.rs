use crate::events::EventKind;
use alloy::primitives::TxHash;
use std::fmt;
use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// A failure reported by the chain provider or the wallet.
///
/// `code` is whatever numeric code the provider attached (JSON-RPC error code, wallet
/// rejection code, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFailure {
    pub code: Option<i64>,
    pub message: String,
}

impl RpcFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code} - {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RpcFailure {}

/// The contract reads that make up a lottery snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LotteryField {
    Phase,
    PrizePool,
    EntryFee,
    PlayerCount,
    RecentWinner,
}

impl fmt::Display for LotteryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LotteryField::Phase => "lottery state",
            LotteryField::PrizePool => "prize pool",
            LotteryField::EntryFee => "entry fee",
            LotteryField::PlayerCount => "player count",
            LotteryField::RecentWinner => "recent winner",
        };
        write!(f, "{name}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Contract info could not be fetched or understood. Blocks everything else.
    #[error("could not load contract info: {reason}")]
    Resolution { reason: String },

    #[error("no wallet provider is available")]
    ProviderUnavailable,

    #[error("wallet connection failed: {reason}")]
    Connection { reason: String },

    #[error("failed reading {field}: {source}")]
    Refresh {
        field: LotteryField,
        source: RpcFailure,
    },

    #[error("contract reported unknown lottery state {0}")]
    UnknownLotteryPhase(u8),

    #[error("{0}")]
    Submission(RpcFailure),

    #[error("transaction {tx_hash} was not confirmed: {source}")]
    Confirmation { tx_hash: TxHash, source: RpcFailure },

    #[error("could not subscribe to {event}: {source}")]
    Subscription { event: EventKind, source: RpcFailure },
}

impl ClientError {
    pub fn resolution(reason: impl Into<String>) -> Self {
        ClientError::Resolution {
            reason: reason.into(),
        }
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        ClientError::Connection {
            reason: reason.into(),
        }
    }

    /// Fatal errors are never fixed by retrying the same operation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Resolution { .. } | ClientError::UnknownLotteryPhase(_)
        )
    }

    /// Provider error code, when the failure came with one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ClientError::Refresh { source, .. }
            | ClientError::Submission(source)
            | ClientError::Confirmation { source, .. }
            | ClientError::Subscription { source, .. } => source.code,
            _ => None,
        }
    }

    /// Short text for the status area.
    pub fn status_text(&self) -> &'static str {
        match self {
            ClientError::Resolution { .. } => "Error: Could not load contract info.",
            ClientError::ProviderUnavailable => "Please install a wallet!",
            ClientError::Connection { .. } => "Failed to connect wallet.",
            ClientError::Refresh { .. } => "Could not refresh lottery info.",
            ClientError::UnknownLotteryPhase(_) => "Contract reported an unknown state.",
            ClientError::Submission(_) | ClientError::Confirmation { .. } => {
                "Failed to enter the lottery."
            }
            ClientError::Subscription { .. } => "Live updates unavailable; use refresh.",
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display__submission_with_code__shows_code_then_message() {
        let error = ClientError::Submission(RpcFailure::with_code(
            -32000,
            "insufficient funds for gas * price + value",
        ));

        assert_eq!(
            error.to_string(),
            "-32000 - insufficient funds for gas * price + value"
        );
        assert_eq!(error.code(), Some(-32000));
    }

    #[test]
    fn display__refresh__names_the_failed_field() {
        let error = ClientError::Refresh {
            field: LotteryField::PlayerCount,
            source: RpcFailure::new("connection reset"),
        };

        assert_eq!(
            error.to_string(),
            "failed reading player count: connection reset"
        );
    }

    #[test]
    fn is_fatal__only_resolution_and_phase_mapping() {
        assert!(ClientError::resolution("404").is_fatal());
        assert!(ClientError::UnknownLotteryPhase(7).is_fatal());
        assert!(!ClientError::ProviderUnavailable.is_fatal());
        assert!(!ClientError::connection("rejected").is_fatal());
        assert!(!ClientError::Submission(RpcFailure::new("x")).is_fatal());
    }
}
