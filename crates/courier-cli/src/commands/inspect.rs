//! Content diagnostics: gateway fetch and locator conversion

use anyhow::{bail, Context, Result};
use clap::Args;
use courier_core::{ContentLocator, CourierConfig, JobId};
use courier_crypto::{derive_session_key, Ed25519Signer, EnvelopeCodec, NonceLength};
use courier_store::{
    decode_stored_envelope, is_locator, locator_to_digest, resolve_locator, AttemptOutcome,
    GatewayFetcher, HttpGatewayClient,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

#[derive(Args)]
pub struct FetchCommand {
    /// Locator (`Qm...`) or 64-character hex ledger digest
    pub target: String,

    /// Open the object as an envelope sealed with this party (hex verifying key)
    #[arg(long, requires = "job")]
    pub counterparty: Option<String>,

    /// Job whose conversation the envelope belongs to
    #[arg(long)]
    pub job: Option<u64>,
}

pub async fn fetch(cmd: FetchCommand, config_path: Option<&Path>) -> Result<()> {
    let config = CourierConfig::load(config_path).context("loading configuration")?;
    let locator = resolve_locator(&cmd.target)?;

    let fetcher = GatewayFetcher::new(
        Arc::new(HttpGatewayClient::new()),
        config.store.gateways.iter().cloned(),
        config.store.gateway_timeout(),
    );
    let (result, attempts) = fetcher.fetch_with_report(&locator).await;
    for attempt in &attempts {
        let outcome = match &attempt.outcome {
            AttemptOutcome::Success { bytes } => format!("ok, {bytes} bytes"),
            AttemptOutcome::TimedOut => "timed out".to_string(),
            AttemptOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        eprintln!(
            "{} ({} ms): {outcome}",
            attempt.gateway,
            attempt.elapsed.as_millis()
        );
    }
    let fetched = result?;

    let body = match (cmd.counterparty, cmd.job) {
        (Some(counterparty), Some(job)) => open_sealed(&config, &fetched, &counterparty, JobId(job))?,
        _ => fetched,
    };
    std::io::stdout().write_all(&body)?;
    Ok(())
}

fn open_sealed(
    config: &CourierConfig,
    fetched: &[u8],
    counterparty_hex: &str,
    job: JobId,
) -> Result<Vec<u8>> {
    let Some(secret) = config.identity.secret_key.as_deref() else {
        bail!("opening an envelope needs identity.secret_key (or COURIER_SECRET_KEY)");
    };
    let signer = Ed25519Signer::from_hex(secret)?;
    let counterparty = hex::decode(counterparty_hex.trim_start_matches("0x"))
        .context("counterparty key is not hex")?;
    let key = derive_session_key(&signer, &counterparty, &job.conversation_id())?;

    let codec = EnvelopeCodec::new(NonceLength::try_from(config.store.nonce_len)?);
    Ok(codec.open_bytes(&decode_stored_envelope(fetched), &key)?)
}

pub fn locator(value: &str) -> Result<()> {
    let value = value.trim();
    if is_locator(value) {
        match locator_to_digest(&ContentLocator::new(value)) {
            Some(digest) => println!("{}", digest.to_hex()),
            None => bail!("{value} is a locator without a 32-byte digest form"),
        }
    } else {
        println!("{}", resolve_locator(value)?);
    }
    Ok(())
}
