//! X.509 parsing for signing certificates.
//!
//! Only structural well-formedness is checked. No chain is built: trust comes
//! from the origin of the URL the certificate was fetched from.

use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::error::{VerifyError, VerifyResult};

/// A parsed signing certificate.
#[derive(Debug, Clone)]
pub struct SigningCertificate {
    url: String,
    subject: String,
    issuer: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    public_key: RsaPublicKey,
}

impl SigningCertificate {
    /// Parse a PEM (first `CERTIFICATE` block) or DER certificate.
    pub fn parse(url: &str, bytes: &[u8]) -> VerifyResult<Self> {
        let invalid = |message: String| VerifyError::CertificateParse {
            url: url.to_string(),
            message,
        };

        let der = if looks_like_pem(bytes) {
            first_pem_certificate(bytes).map_err(invalid)?
        } else {
            bytes.to_vec()
        };

        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| invalid(format!("malformed X.509 certificate: {}", e)))?;

        let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| invalid(format!("certificate does not carry an RSA public key: {}", e)))?;

        let validity = cert.validity();
        let not_before = to_utc(validity.not_before.timestamp())
            .ok_or_else(|| invalid("notBefore out of range".to_string()))?;
        let not_after = to_utc(validity.not_after.timestamp())
            .ok_or_else(|| invalid("notAfter out of range".to_string()))?;

        Ok(Self {
            url: url.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            public_key,
        })
    }

    /// URL the certificate was fetched from (the cache key).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `at` falls inside the certificate's validity window.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes.windows(11).any(|w| w == b"-----BEGIN ")
}

fn first_pem_certificate(bytes: &[u8]) -> Result<Vec<u8>, String> {
    for pem in Pem::iter_from_buffer(bytes) {
        let pem = pem.map_err(|e| format!("malformed PEM: {}", e))?;
        if pem.label == "CERTIFICATE" {
            return Ok(pem.contents);
        }
    }
    Err("no CERTIFICATE block in PEM data".to_string())
}

fn to_utc(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_PEM: &str = include_str!("../../tests/fixtures/signing_cert.pem");
    const KEY_PEM: &str = include_str!("../../tests/fixtures/signing_key.pem");
    const URL: &str = "https://sns.us-west-2.amazonaws.com/cert.pem";

    #[test]
    fn test_parse_pem() {
        let cert = SigningCertificate::parse(URL, CERT_PEM.as_bytes()).unwrap();
        assert_eq!(cert.url(), URL);
        assert!(cert.subject().contains("sns.us-west-2.amazonaws.com"));
        assert!(cert.is_valid_at(Utc::now()));
        assert!(cert.not_before() < cert.not_after());
    }

    #[test]
    fn test_parse_der() {
        let der = first_pem_certificate(CERT_PEM.as_bytes()).unwrap();
        let from_der = SigningCertificate::parse(URL, &der).unwrap();
        let from_pem = SigningCertificate::parse(URL, CERT_PEM.as_bytes()).unwrap();
        assert_eq!(from_der.public_key(), from_pem.public_key());
    }

    #[test]
    fn test_pem_without_certificate_block() {
        let err = SigningCertificate::parse(URL, KEY_PEM.as_bytes()).unwrap_err();
        match err {
            VerifyError::CertificateParse { message, .. } => {
                assert!(message.contains("no CERTIFICATE block"), "{}", message)
            }
            other => panic!("expected CertificateParse, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        let cases: [&[u8]; 3] = [b"", b"<html>not found</html>", &[0x30, 0x82, 0x01]];
        for bytes in cases {
            assert!(matches!(
                SigningCertificate::parse(URL, bytes),
                Err(VerifyError::CertificateParse { .. })
            ));
        }
    }
}
