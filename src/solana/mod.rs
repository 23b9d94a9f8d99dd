use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, SettlementError};

pub mod gateway;
pub mod rpc;

pub use gateway::SolanaOracleGateway;

/// How durably the ledger has accepted a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationLevel {
    /// The ledger does not know the reference yet. Not an error.
    NotVisible,
    Processed,
    Confirmed,
    Finalized,
    /// The ledger reported a permanent execution error for the transaction.
    Rejected(String),
}

impl ConfirmationLevel {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationLevel::Confirmed | ConfirmationLevel::Finalized)
    }
}

/// Everything the gateway needs to build one oracle submission.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub league_id: Uuid,
    pub winner_id: Uuid,
    pub payout_address: String,
    pub final_score: f64,
    pub announced_at: DateTime<Utc>,
}

/// Bridge between local settlement state and the external ledger RPC.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Submit a winner announcement, returning the ledger transaction
    /// reference.
    async fn submit(&self, request: &SubmissionRequest) -> Result<String>;

    /// Current confirmation level for a submitted reference. Never errors for
    /// a reference the ledger merely has not seen yet.
    async fn confirmation(&self, tx_ref: &str) -> Result<ConfirmationLevel>;
}

/// Payout addresses are base58-encoded 32-byte public keys.
pub fn is_valid_payout_address(address: &str) -> bool {
    let trimmed = address.trim();
    if !(32..=44).contains(&trimmed.len()) {
        return false;
    }
    match bs58::decode(trimmed).into_vec() {
        Ok(bytes) => bytes.len() == 32,
        Err(_) => false,
    }
}

pub fn validate_payout_address(address: &str) -> Result<()> {
    if is_valid_payout_address(address) {
        Ok(())
    } else {
        Err(SettlementError::InvalidPayoutAddress(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wellformed_address() {
        // 32 bytes of 0x01, base58 encoded.
        let addr = bs58::encode([1u8; 32]).into_string();
        assert!(is_valid_payout_address(&addr));
        assert!(is_valid_payout_address(&format!("  {addr}  ")));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_payout_address(""));
        assert!(!is_valid_payout_address("not-base58-0OIl"));
        assert!(!is_valid_payout_address("abc"));
        // Valid base58 but wrong decoded length.
        let short = bs58::encode([1u8; 16]).into_string();
        assert!(!is_valid_payout_address(&short));
    }

    #[test]
    fn confirmation_levels() {
        assert!(ConfirmationLevel::Confirmed.is_confirmed());
        assert!(ConfirmationLevel::Finalized.is_confirmed());
        assert!(!ConfirmationLevel::Processed.is_confirmed());
        assert!(!ConfirmationLevel::NotVisible.is_confirmed());
        assert!(!ConfirmationLevel::Rejected("err".into()).is_confirmed());
    }
}
