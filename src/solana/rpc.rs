use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{Result, SettlementError};
use crate::solana::ConfirmationLevel;

/// Minimal JSON-RPC client for the two ledger calls the pipeline needs:
/// `sendTransaction` and `getSignatureStatuses`.
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    /// `timeout` bounds every request; it must be shorter than the poller's
    /// confirmation deadline.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::Config(format!("rpc client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: Value = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown rpc error");
            return Err(SettlementError::Rpc(format!("{method}: {message} (code {code})")));
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| SettlementError::Rpc(format!("{method}: response missing result")))
    }

    /// Submit a signed payload, returning the transaction reference.
    pub async fn send_transaction(&self, signed_tx_base64: &str) -> Result<String> {
        let result = self
            .call(
                "sendTransaction",
                json!([signed_tx_base64, { "encoding": "base64", "skipPreflight": false }]),
            )
            .await
            .map_err(|e| SettlementError::GatewaySubmissionFailed(e.to_string()))?;

        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                SettlementError::GatewaySubmissionFailed("non-string transaction reference".into())
            })
    }

    /// Confirmation level for one reference. An unknown reference is
    /// `NotVisible`, not an error.
    pub async fn get_signature_status(&self, tx_ref: &str) -> Result<ConfirmationLevel> {
        let result = self
            .call(
                "getSignatureStatuses",
                json!([[tx_ref], { "searchTransactionHistory": true }]),
            )
            .await?;

        Ok(parse_signature_status(&result))
    }
}

/// Interpret a `getSignatureStatuses` result for a single reference.
pub fn parse_signature_status(result: &Value) -> ConfirmationLevel {
    let entry = match result.get("value").and_then(|v| v.get(0)) {
        Some(entry) if !entry.is_null() => entry,
        _ => return ConfirmationLevel::NotVisible,
    };

    if let Some(err) = entry.get("err") {
        if !err.is_null() {
            return ConfirmationLevel::Rejected(err.to_string());
        }
    }

    match entry.get("confirmationStatus").and_then(Value::as_str) {
        Some("finalized") => ConfirmationLevel::Finalized,
        Some("confirmed") => ConfirmationLevel::Confirmed,
        Some("processed") => ConfirmationLevel::Processed,
        _ => ConfirmationLevel::NotVisible,
    }
}
