//! Credential encryption boundary
//!
//! Xtream passwords are stored as opaque blobs. The real cipher lives outside
//! this crate; the ingestion core only needs to turn a blob back into
//! plaintext right before it builds a request.

use crate::error::DecryptionFailed;

pub trait CredentialCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;

    fn decrypt(&self, blob: &str) -> Result<String, DecryptionFailed>;
}

/// Pass-through cipher for deployments that keep secrets elsewhere
/// (and for tests). Rejects empty blobs so a missing password surfaces as
/// a credential error instead of an upstream 401.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl CredentialCipher for PlaintextCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        plaintext.to_string()
    }

    fn decrypt(&self, blob: &str) -> Result<String, DecryptionFailed> {
        if blob.is_empty() {
            return Err(DecryptionFailed("empty credential blob".to_string()));
        }
        Ok(blob.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_round_trip_and_empty_blob() {
        let cipher = PlaintextCipher;
        let blob = cipher.encrypt("s3cret");
        assert_eq!(cipher.decrypt(&blob).unwrap(), "s3cret");
        assert!(cipher.decrypt("").is_err());
    }
}
