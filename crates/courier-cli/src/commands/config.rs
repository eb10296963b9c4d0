//! Configuration check

use anyhow::{Context, Result};
use courier_core::CourierConfig;
use courier_crypto::{Ed25519Signer, SigningCapability};
use std::path::Path;

/// Load, validate, and print the effective configuration with secrets removed
pub fn check(config_path: Option<&Path>) -> Result<()> {
    let config = CourierConfig::load(config_path).context("loading configuration")?;
    println!("{}", describe(&config)?);
    Ok(())
}

fn describe(config: &CourierConfig) -> Result<String> {
    config.validate()?;
    let address = match config.identity.secret_key.as_deref() {
        Some(secret) => Ed25519Signer::from_hex(secret)?.address().to_string(),
        None => String::new(),
    };

    let mut redacted = config.clone();
    redacted.identity.secret_key = None;
    redacted.store.pin_token = redacted.store.pin_token.map(|_| "<redacted>".to_string());
    let rendered = toml::to_string_pretty(&redacted).context("rendering configuration")?;
    Ok(format!("# address = \"{address}\"\n{rendered}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn test_describe_hides_secrets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[identity]\nsecret_key = \"{SEED}\"\n\n[store]\npin_token = \"jwt-token\""
        )
        .unwrap();
        let config = CourierConfig::load_from_file(file.path()).unwrap();

        let text = describe(&config).unwrap();
        assert!(!text.contains(SEED));
        assert!(!text.contains("jwt-token"));
        assert!(text.contains("<redacted>"));
        assert!(text.starts_with("# address = \"0x"));
    }

    #[test]
    fn test_describe_rejects_invalid_config() {
        let config = CourierConfig::default();
        assert!(describe(&config).is_err());
    }
}
