//! Certificate URL origin validation.
//!
//! Runs before any network access: a URL that fails here is never fetched.

use url::Url;

use crate::error::{VerifyError, VerifyResult};
use crate::types::OriginPolicy;

const AWS_SUFFIXES: &[&str] = &[".amazonaws.com", ".amazonaws.com.cn"];

/// Check a signing certificate URL against the origin policy.
pub fn validate_cert_url(raw: &str, policy: OriginPolicy) -> VerifyResult<Url> {
    let untrusted = |reason: &str| VerifyError::UntrustedOrigin {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| untrusted(&format!("invalid URL: {}", e)))?;

    if url.scheme() != "https" {
        return Err(untrusted("SigningCertURL is not using HTTPS"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| untrusted("SigningCertURL has no host"))?;

    let trusted = match policy {
        OriginPolicy::AwsSns => {
            host.starts_with("sns.") && AWS_SUFFIXES.iter().any(|s| host.ends_with(s))
        }
        OriginPolicy::Legacy => host.starts_with("sns") && !host.ends_with("amazonaws.com"),
    };

    if !trusted {
        return Err(untrusted("SigningCertURL host is not an SNS endpoint"));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aws_policy_accepts_regional_hosts() {
        for url in [
            "https://sns.us-west-2.amazonaws.com/SimpleNotificationService-f3ecfb7224c7233fe7bb5f59f96de52f.pem",
            "https://sns.us-east-1.amazonaws.com/cert.pem",
            "https://sns.cn-north-1.amazonaws.com.cn/cert.pem",
            "https://SNS.EU-WEST-1.AMAZONAWS.COM/cert.pem",
        ] {
            assert!(
                validate_cert_url(url, OriginPolicy::AwsSns).is_ok(),
                "{} should be trusted",
                url
            );
        }
    }

    #[test]
    fn test_aws_policy_rejects_lookalikes() {
        for url in [
            "http://sns.us-west-2.amazonaws.com/cert.pem",
            "https://sns.attacker.example/cert.pem",
            "https://snsfake.us-west-2.amazonaws.com/cert.pem",
            "https://sns.us-west-2.amazonaws.com.attacker.example/cert.pem",
            "https://s3.amazonaws.com/cert.pem",
            "https://evil.com/sns.us-west-2.amazonaws.com/cert.pem",
            "not a url",
            "file:///etc/ssl/cert.pem",
        ] {
            let err = validate_cert_url(url, OriginPolicy::AwsSns).unwrap_err();
            assert!(
                matches!(err, VerifyError::UntrustedOrigin { .. }),
                "{} should be untrusted",
                url
            );
        }
    }

    #[test]
    fn test_legacy_policy_reproduces_historical_rule() {
        // Genuine AWS hosts fail the historical check.
        assert!(validate_cert_url(
            "https://sns.us-west-2.amazonaws.com/cert.pem",
            OriginPolicy::Legacy
        )
        .is_err());

        // Any https host starting with "sns" that is not under amazonaws.com passes.
        assert!(validate_cert_url("https://snsmirror.example.org/cert.pem", OriginPolicy::Legacy).is_ok());

        assert!(validate_cert_url("http://snsmirror.example.org/cert.pem", OriginPolicy::Legacy).is_err());
        assert!(validate_cert_url("https://mirror.example.org/cert.pem", OriginPolicy::Legacy).is_err());
    }
}
