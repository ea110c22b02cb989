//! Signature verification.
//!
//! SNS `SignatureVersion` 1 signs the canonical string-to-sign with RSA
//! PKCS#1 v1.5 over SHA-1. The scheme is fixed by the signer and must not be
//! upgraded here.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha1::Sha1;
use tracing::debug;

use crate::canonicalize::string_to_sign;
use crate::cert_store::{CertificateStore, SigningCertificate};
use crate::error::{VerifyError, VerifyResult};
use crate::types::{fields, NotificationMessage};

/// Verifies message signatures against certificates from a shared store.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    store: CertificateStore,
}

impl SignatureVerifier {
    pub fn new(store: CertificateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Verify the `Signature` field of `message`.
    ///
    /// # Verification Steps
    ///
    /// 1. Build the string-to-sign for the message type
    /// 2. Get the certificate at `SigningCertURL` (origin check, cache, fetch)
    /// 3. Base64-decode `Signature`
    /// 4. RSA/SHA-1 verify with the certificate's public key
    ///
    /// Any failure is reported as [`VerifyError::Signature`]; the underlying
    /// error, if any, is kept as its source.
    pub async fn verify(&self, message: &NotificationMessage) -> VerifyResult<()> {
        let message_type = message.message_type();
        let canonical = string_to_sign(message_type, message).ok_or_else(|| {
            VerifyError::signature(
                format!("unsupported message type {:?}", message.get(fields::TYPE)),
                None,
            )
        })?;

        let cert_url = message
            .get(fields::SIGNING_CERT_URL)
            .ok_or_else(|| VerifyError::signature("missing SigningCertURL", None))?;

        let certificate = self
            .store
            .get_certificate(cert_url)
            .await
            .map_err(|e| VerifyError::signature("signing certificate unavailable", Some(e)))?;

        let signature_b64 = message
            .get(fields::SIGNATURE)
            .ok_or_else(|| VerifyError::signature("missing Signature", None))?;

        verify_with_certificate(canonical.as_bytes(), signature_b64, &certificate)?;

        debug!(
            message_type = ?message_type,
            cert_url = %cert_url,
            "signature verified"
        );
        Ok(())
    }
}

/// Check a Base64 RSA/SHA-1 signature over `signed_bytes`.
pub fn verify_with_certificate(
    signed_bytes: &[u8],
    signature_b64: &str,
    certificate: &SigningCertificate,
) -> VerifyResult<()> {
    let sig_bytes = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| VerifyError::signature(format!("invalid base64 signature: {}", e), None))?;

    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| VerifyError::signature(format!("malformed signature: {}", e), None))?;

    let verifying_key = VerifyingKey::<Sha1>::new(certificate.public_key().clone());
    verifying_key
        .verify(signed_bytes, &signature)
        .map_err(|_| VerifyError::signature("signature does not match", None))
}
