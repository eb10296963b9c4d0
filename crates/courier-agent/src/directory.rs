//! JSON-RPC job directory client
//!
//! Talks JSON-RPC 2.0 to a ledger bridge. Mutating methods return once the
//! bridge reports the transaction confirmed. Bytes travel as `0x` hex and
//! job ids as decimal strings; error code [`STATE_CONFLICT_CODE`] marks a
//! job that is no longer open or assignable.

use async_trait::async_trait;
use courier_core::{
    ActorAddress, ContentDigest, CourierError, DirectoryConfig, IdentityProfile, Job, JobDirectory,
    JobId, Result,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Bridge error code for "job no longer open or assignable"
pub const STATE_CONFLICT_CODE: i64 = -32010;

/// Method names exposed by the ledger bridge
pub mod methods {
    /// Total number of jobs
    pub const JOB_COUNT: &str = "directory_jobCount";
    /// One job as a positional tuple
    pub const GET_JOB: &str = "directory_getJob";
    /// Submit an application
    pub const APPLY_TO_JOB: &str = "directory_applyToJob";
    /// Submit a signed take-action
    pub const ASSIGN_JOB: &str = "directory_assignJob";
    /// Record a delivered result
    pub const DELIVER_RESULT: &str = "directory_deliverResult";
    /// Registration check
    pub const IS_REGISTERED: &str = "directory_isRegistered";
    /// Published verification key
    pub const PUBLIC_KEY_OF: &str = "directory_publicKeyOf";
    /// Identity registration
    pub const REGISTER_IDENTITY: &str = "directory_registerIdentity";
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Job directory over JSON-RPC
#[derive(Debug)]
pub struct RpcJobDirectory {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcJobDirectory {
    /// Client for the bridge at `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Client from directory settings
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(config.rpc_url.clone(), config.request_timeout())
    }

    async fn call(&self, method: &str, params: Value, job: Option<JobId>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::trace!(method, id, "Directory request");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::transport(format!("{method} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourierError::transport(format!(
                "{method} returned HTTP {status}"
            )));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| CourierError::serialization(format!("{method} response: {e}")))?;
        decode_response(method, envelope, job)
    }
}

fn decode_response(method: &str, envelope: RpcResponse, job: Option<JobId>) -> Result<Value> {
    if let Some(error) = envelope.error {
        return Err(match (error.code, job) {
            (STATE_CONFLICT_CODE, Some(job)) => CourierError::state_conflict(job.0, error.message),
            (code, _) => {
                CourierError::transport(format!("{method} rejected ({code}): {}", error.message))
            }
        });
    }
    envelope
        .result
        .ok_or_else(|| CourierError::serialization(format!("{method} response has no result")))
}

fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_u64(method: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex_part) => u64::from_str_radix(hex_part, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
    .ok_or_else(|| CourierError::serialization(format!("{method}: expected an integer, got {value}")))
}

fn decode_key(value: &Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let hex_part = s.trim().trim_start_matches("0x");
            if hex_part.is_empty() {
                return Ok(None);
            }
            let bytes = hex::decode(hex_part)
                .map_err(|e| CourierError::serialization(format!("Public key is not hex: {e}")))?;
            Ok((!bytes.iter().all(|b| *b == 0)).then_some(bytes))
        }
        other => Err(CourierError::serialization(format!(
            "Public key has unexpected shape: {other}"
        ))),
    }
}

#[async_trait]
impl JobDirectory for RpcJobDirectory {
    async fn job_count(&self) -> Result<u64> {
        let value = self.call(methods::JOB_COUNT, json!([]), None).await?;
        decode_u64(methods::JOB_COUNT, &value)
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        let value = self
            .call(methods::GET_JOB, json!([id.0.to_string()]), Some(id))
            .await?;
        let fields = value.as_array().ok_or_else(|| {
            CourierError::serialization(format!("{}: job {id} is not a tuple", methods::GET_JOB))
        })?;
        Job::from_ledger_tuple(id, fields)
    }

    async fn apply_to_job(
        &self,
        id: JobId,
        recipient: &ActorAddress,
        content_digest: ContentDigest,
    ) -> Result<()> {
        self.call(
            methods::APPLY_TO_JOB,
            json!([id.0.to_string(), recipient.as_str(), content_digest.to_hex()]),
            Some(id),
        )
        .await?;
        tracing::info!(job = %id, digest = %content_digest, "Application confirmed");
        Ok(())
    }

    async fn assign_job(&self, id: JobId, signature: &[u8]) -> Result<()> {
        self.call(
            methods::ASSIGN_JOB,
            json!([id.0.to_string(), hex_bytes(signature)]),
            Some(id),
        )
        .await?;
        tracing::info!(job = %id, "Take-action confirmed");
        Ok(())
    }

    async fn deliver_result(&self, id: JobId, result_digest: ContentDigest) -> Result<()> {
        self.call(
            methods::DELIVER_RESULT,
            json!([id.0.to_string(), result_digest.to_hex()]),
            Some(id),
        )
        .await?;
        tracing::info!(job = %id, digest = %result_digest, "Delivery confirmed");
        Ok(())
    }

    async fn is_registered(&self, address: &ActorAddress) -> Result<bool> {
        let value = self
            .call(methods::IS_REGISTERED, json!([address.as_str()]), None)
            .await?;
        value.as_bool().ok_or_else(|| {
            CourierError::serialization(format!("{}: expected a bool", methods::IS_REGISTERED))
        })
    }

    async fn public_key_of(&self, address: &ActorAddress) -> Result<Option<Vec<u8>>> {
        let value = self
            .call(methods::PUBLIC_KEY_OF, json!([address.as_str()]), None)
            .await?;
        decode_key(&value)
    }

    async fn register_identity(&self, public_key: &[u8], profile: &IdentityProfile) -> Result<()> {
        self.call(
            methods::REGISTER_IDENTITY,
            json!([hex_bytes(public_key), profile]),
            None,
        )
        .await?;
        tracing::info!(name = %profile.name, "Identity registration confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn response(text: &str) -> RpcResponse {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_state_conflict_code_maps_to_conflict() {
        let envelope = response(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32010,"message":"job not open"}}"#,
        );
        let err = decode_response(methods::ASSIGN_JOB, envelope, Some(JobId(4))).unwrap_err();
        assert_matches!(err, CourierError::StateConflict { job_id: 4, .. });
    }

    #[test]
    fn test_other_rpc_errors_are_transport() {
        let envelope = response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#);
        let err = decode_response(methods::APPLY_TO_JOB, envelope, Some(JobId(4))).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_result_is_serialization_error() {
        let envelope = response(r#"{"jsonrpc":"2.0","id":1}"#);
        let err = decode_response(methods::JOB_COUNT, envelope, None).unwrap_err();
        assert_matches!(err, CourierError::Serialization { .. });
    }

    #[test]
    fn test_integer_decoding() {
        assert_eq!(decode_u64("m", &json!(12)).unwrap(), 12);
        assert_eq!(decode_u64("m", &json!("12")).unwrap(), 12);
        assert_eq!(decode_u64("m", &json!("0x1f")).unwrap(), 31);
        assert!(decode_u64("m", &json!(true)).is_err());
    }

    #[test]
    fn test_empty_keys_decode_to_none() {
        assert_eq!(decode_key(&json!(null)).unwrap(), None);
        assert_eq!(decode_key(&json!("0x")).unwrap(), None);
        assert_eq!(decode_key(&json!(format!("0x{}", "00".repeat(32)))).unwrap(), None);
        assert_eq!(decode_key(&json!("0x0102")).unwrap(), Some(vec![1, 2]));
    }
}
