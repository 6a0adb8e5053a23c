//! Boot and device identity used to stamp recording sessions.
//!
//! Each session directory carries two zero-length marker files named after the
//! boot identifier (fresh per power cycle) and the device identifier (stable
//! for the unit). The provider trait keeps the storage stage independent of
//! where those identifiers come from.

use tracing::info;
use uuid::Uuid;

/// Supplies the identifiers a session is stamped with.
pub trait IdentityProvider: Send + Sync {
    /// Identifier for this boot of the device. New on every construction of
    /// the provider.
    fn boot_id(&self) -> &str;

    /// Stable identifier for the device itself.
    fn device_id(&self) -> &str;
}

/// UUID-backed identity. The boot id is a fresh v4 UUID; the device id is
/// supplied by the caller (configuration or a hardware serial) or generated
/// once when none is available.
#[derive(Debug, Clone)]
pub struct UuidIdentity {
    boot_id: String,
    device_id: String,
}

impl UuidIdentity {
    /// Creates an identity with the given device id and a fresh boot id.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            boot_id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
        }
    }

    /// Creates an identity generating both identifiers. The generated device
    /// id is only suitable for bench runs; real deployments supply one.
    pub fn generate() -> Self {
        let device_id = Uuid::new_v4().to_string();
        info!(%device_id, "no device id supplied, generated one");
        Self::new(device_id)
    }
}

impl IdentityProvider for UuidIdentity {
    fn boot_id(&self) -> &str {
        &self.boot_id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Fixed identity for tests that assert on marker file names.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    /// Boot identifier to report.
    pub boot_id: String,
    /// Device identifier to report.
    pub device_id: String,
}

impl IdentityProvider for FixedIdentity {
    fn boot_id(&self) -> &str {
        &self.boot_id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}
