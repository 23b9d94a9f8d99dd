use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Result, SettlementError};
use crate::solana::rpc::RpcClient;
use crate::solana::{validate_payout_address, ConfirmationLevel, LedgerGateway, SubmissionRequest};

/// Instruction discriminator the oracle program expects for winner
/// announcements.
const ANNOUNCE_WINNER_DISCRIMINATOR: u64 = 0;

enum SubmissionMode {
    /// Sign with the configured oracle wallet and submit over RPC.
    Keyed(SigningKey),
    /// Return a deterministic placeholder reference without touching the
    /// ledger. Refused on mainnet at config load.
    Mock,
}

/// Gateway to the Solana oracle program: validates the payout destination,
/// builds and signs the announcement payload, and talks JSON-RPC.
pub struct SolanaOracleGateway {
    rpc: RpcClient,
    program_id: Option<String>,
    network: String,
    mode: SubmissionMode,
}

impl SolanaOracleGateway {
    pub fn from_config(config: &Config) -> Result<Self> {
        let rpc = RpcClient::new(&config.rpc_endpoint, config.rpc_timeout())?;

        let mode = match (&config.oracle_wallet_key, &config.oracle_program_id) {
            (Some(key), Some(_)) => SubmissionMode::Keyed(load_signing_key(key)?),
            _ if config.mock_submission => {
                tracing::warn!(
                    network = %config.network,
                    "oracle credentials unconfigured, using mock submissions"
                );
                SubmissionMode::Mock
            }
            _ => return Err(SettlementError::CredentialsMissing),
        };

        Ok(Self {
            rpc,
            program_id: config.oracle_program_id.clone(),
            network: config.network.clone(),
            mode,
        })
    }

    /// Announcement payload as the oracle program's instruction data: an
    /// 8-byte discriminator followed by the JSON-encoded winner facts.
    fn instruction_data(&self, request: &SubmissionRequest) -> Result<Vec<u8>> {
        let payload = json!({
            "event_type": "LEAGUE_WINNER_ANNOUNCED",
            "league_id": request.league_id,
            "winner_id": request.winner_id,
            "payout_address": request.payout_address,
            "final_score": request.final_score,
            "announced_at": request.announced_at.timestamp_millis(),
            "network": self.network,
            "program_id": self.program_id,
        });
        let body = serde_json::to_vec(&payload)?;

        let mut data = Vec::with_capacity(8 + body.len());
        data.extend_from_slice(&ANNOUNCE_WINNER_DISCRIMINATOR.to_le_bytes());
        data.extend_from_slice(&body);
        Ok(data)
    }

    /// Wire payload: detached signature, then the signer's public key, then
    /// the instruction data, base64-encoded for `sendTransaction`.
    fn signed_payload(key: &SigningKey, instruction_data: &[u8]) -> String {
        let signature = key.sign(instruction_data);

        let mut wire =
            Vec::with_capacity(64 + 32 + instruction_data.len());
        wire.extend_from_slice(&signature.to_bytes());
        wire.extend_from_slice(key.verifying_key().as_bytes());
        wire.extend_from_slice(instruction_data);
        BASE64.encode(wire)
    }

    /// Deterministic 64-byte placeholder reference, base58 like a real one.
    fn mock_reference(request: &SubmissionRequest) -> String {
        let fingerprint = format!(
            "mock:{}:{}:{}",
            request.league_id, request.winner_id, request.payout_address
        );

        let first: [u8; 32] = Sha256::digest(fingerprint.as_bytes()).into();
        let second: [u8; 32] = Sha256::digest(first).into();

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&first);
        bytes[32..].copy_from_slice(&second);
        bs58::encode(bytes).into_string()
    }
}

#[async_trait]
impl LedgerGateway for SolanaOracleGateway {
    async fn submit(&self, request: &SubmissionRequest) -> Result<String> {
        validate_payout_address(&request.payout_address)?;

        let key = match &self.mode {
            SubmissionMode::Keyed(key) => key,
            SubmissionMode::Mock => {
                let tx_ref = Self::mock_reference(request);
                tracing::warn!(
                    league_id = %request.league_id,
                    tx_ref = %tx_ref,
                    "mock submission, nothing sent to the ledger"
                );
                return Ok(tx_ref);
            }
        };

        let data = self.instruction_data(request)?;
        let signed = Self::signed_payload(key, &data);

        let tx_ref = self.rpc.send_transaction(&signed).await?;
        tracing::info!(
            league_id = %request.league_id,
            tx_ref = %tx_ref,
            "submitted winner announcement to ledger"
        );
        Ok(tx_ref)
    }

    async fn confirmation(&self, tx_ref: &str) -> Result<ConfirmationLevel> {
        if matches!(self.mode, SubmissionMode::Mock) {
            // Mock references never reach the ledger; report them confirmed
            // so local runs complete the pipeline.
            return Ok(ConfirmationLevel::Confirmed);
        }
        self.rpc.get_signature_status(tx_ref).await
    }
}

/// Oracle wallet keys carry either a 64-byte solana keypair (seed then public
/// key) or a bare 32-byte seed, encoded as base58 or hex. A base58 encoding
/// of either length never has 64 or 128 characters, so the two are told apart
/// by shape.
fn load_signing_key(encoded: &str) -> Result<SigningKey> {
    let trimmed = encoded.trim();
    let looks_hex =
        matches!(trimmed.len(), 64 | 128) && trimmed.bytes().all(|b| b.is_ascii_hexdigit());

    let bytes = if looks_hex {
        hex::decode(trimmed)
            .map_err(|e| SettlementError::Config(format!("oracle wallet key: {e}")))?
    } else {
        bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| SettlementError::Config(format!("oracle wallet key: {e}")))?
    };

    let seed: [u8; 32] = match bytes.len() {
        64 => bytes[..32]
            .try_into()
            .map_err(|_| SettlementError::Config("oracle wallet key: bad seed".into()))?,
        32 => bytes
            .as_slice()
            .try_into()
            .map_err(|_| SettlementError::Config("oracle wallet key: bad seed".into()))?,
        other => {
            return Err(SettlementError::Config(format!(
                "oracle wallet key: expected 32 or 64 bytes, got {other}"
            )))
        }
    };

    Ok(SigningKey::from_bytes(&seed))
}
