//! HMAC-SHA256 signing key shared by the issuer and the verifier.

use std::fmt;
use std::path::Path;

use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::error::GateError;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// HMAC-SHA256 key used to sign and verify credentials.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Create a key from raw secret bytes.
    ///
    /// Rejects secrets shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: &[u8]) -> Result<Self, GateError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(GateError::config(format!(
                "HMAC secret is {} bytes, at least {} required",
                secret.len(),
                MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// Load the secret from a file and build a key from it.
    ///
    /// Trailing newlines are stripped so `echo secret > file` works.
    pub fn from_file(path: &Path) -> Result<Self, GateError> {
        let mut secret = load_secret(path)?;
        while matches!(secret.last(), Some(b'\n' | b'\r')) {
            secret.pop();
        }
        Self::new(&secret)
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(HMAC-SHA256, redacted)")
    }
}

/// Load an HMAC secret from a file.
///
/// Security: Verifies the file has restrictive permissions (0600 or 0400)
/// before loading to prevent secrets from being readable by other users.
pub fn load_secret(path: &Path) -> Result<Vec<u8>, GateError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        GateError::config(format!(
            "Failed to read HMAC secret metadata from {}: {}",
            path.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        // Group and world bits must all be zero
        if mode & 0o077 != 0 {
            return Err(GateError::config(format!(
                "HMAC secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                path.display(),
                mode & 0o777
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    std::fs::read(path).map_err(|e| {
        GateError::config(format!(
            "Failed to read HMAC secret from {}: {}",
            path.display(),
            e
        ))
    })
}
