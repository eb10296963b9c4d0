//! Identity bootstrap
//!
//! Before any job traffic the local actor makes sure the directory publishes
//! its verification key. A published key that differs from the local signer
//! would make every counterparty derive the wrong session key, so that case
//! stops startup.

use courier_core::{CourierError, IdentityConfig, JobDirectory, Result};
use courier_crypto::SigningCapability;

/// Outcome of [`ensure_identity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Directory already publishes the local key
    AlreadyRegistered,
    /// Registration submitted and confirmed now
    Registered,
    /// Not registered and auto-registration is off
    Unregistered,
}

/// Check the local identity against the directory, registering it when
/// allowed.
pub async fn ensure_identity(
    directory: &dyn JobDirectory,
    signer: &dyn SigningCapability,
    config: &IdentityConfig,
) -> Result<IdentityStatus> {
    let address = signer.address();
    let local_key = signer.verifying_key();

    if directory.is_registered(&address).await? {
        return match directory.public_key_of(&address).await? {
            Some(published) if published.as_slice() == local_key.as_slice() => {
                tracing::info!(%address, "Identity already registered");
                Ok(IdentityStatus::AlreadyRegistered)
            }
            published => Err(CourierError::IdentityMismatch {
                address: address.to_string(),
                published: published.map(hex::encode).unwrap_or_default(),
                local: hex::encode(local_key),
            }),
        };
    }

    if !config.auto_register {
        tracing::warn!(%address, "Identity not registered and auto_register is off; counterparties cannot reach us");
        return Ok(IdentityStatus::Unregistered);
    }

    tracing::info!(%address, name = %config.profile.name, "Registering identity");
    directory.register_identity(&local_key, &config.profile).await?;
    Ok(IdentityStatus::Registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use courier_testkit::{test_signer, DirectoryCall, MemoryJobDirectory};

    #[tokio::test]
    async fn test_registers_when_unknown() {
        let signer = test_signer(1);
        let directory = MemoryJobDirectory::new(signer.address());

        let status = ensure_identity(&directory, &signer, &IdentityConfig::default())
            .await
            .unwrap();
        assert_eq!(status, IdentityStatus::Registered);
        assert_matches!(directory.calls().as_slice(), [DirectoryCall::Register { .. }]);

        let again = ensure_identity(&directory, &signer, &IdentityConfig::default())
            .await
            .unwrap();
        assert_eq!(again, IdentityStatus::AlreadyRegistered);
        assert_eq!(directory.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_key_is_fatal() {
        let signer = test_signer(1);
        let directory = MemoryJobDirectory::new(signer.address());
        directory.register_key(signer.address(), test_signer(2).verifying_key().to_vec());

        let err = ensure_identity(&directory, &signer, &IdentityConfig::default())
            .await
            .unwrap_err();
        assert_matches!(err, CourierError::IdentityMismatch { .. });
    }

    #[tokio::test]
    async fn test_auto_register_off() {
        let signer = test_signer(1);
        let directory = MemoryJobDirectory::new(signer.address());
        let config = IdentityConfig {
            auto_register: false,
            ..IdentityConfig::default()
        };
        let status = ensure_identity(&directory, &signer, &config).await.unwrap();
        assert_eq!(status, IdentityStatus::Unregistered);
        assert!(directory.calls().is_empty());
    }
}
