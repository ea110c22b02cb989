//! Notification model and configuration types.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};

/// Field names used by the SNS message format.
pub mod fields {
    pub const TYPE: &str = "Type";
    pub const MESSAGE: &str = "Message";
    pub const MESSAGE_ID: &str = "MessageId";
    pub const SUBJECT: &str = "Subject";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const TOPIC_ARN: &str = "TopicArn";
    pub const SUBSCRIBE_URL: &str = "SubscribeURL";
    pub const TOKEN: &str = "Token";
    pub const SIGNING_CERT_URL: &str = "SigningCertURL";
    pub const SIGNATURE_VERSION: &str = "SignatureVersion";
    pub const SIGNATURE: &str = "Signature";
}

/// The only signature version this crate verifies.
pub const SUPPORTED_SIGNATURE_VERSION: &str = "1";

/// Kind of SNS message, taken from the `Type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Notification,
    SubscriptionConfirmation,
    UnsubscribeConfirmation,
    Unknown,
}

impl MessageType {
    /// Classify a `Type` field value. Matching is exact and case-sensitive.
    pub fn from_type_field(value: Option<&str>) -> Self {
        match value {
            Some("Notification") => Self::Notification,
            Some("SubscriptionConfirmation") => Self::SubscriptionConfirmation,
            Some("UnsubscribeConfirmation") => Self::UnsubscribeConfirmation,
            _ => Self::Unknown,
        }
    }

    /// Whether this is one of the two subscription-management types.
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionConfirmation | Self::UnsubscribeConfirmation
        )
    }
}

/// An inbound SNS message: a flat mapping of field name to string value.
///
/// Built once from the request body and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationMessage {
    fields: BTreeMap<String, String>,
}

impl NotificationMessage {
    /// Parse a request body. Anything but a JSON object of string values is rejected.
    pub fn from_json(payload: &str) -> VerifyResult<Self> {
        serde_json::from_str(payload).map_err(|e| VerifyError::MalformedPayload {
            message: e.to_string(),
        })
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Message type from the `Type` field.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_type_field(self.get(fields::TYPE))
    }

    /// Iterate fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, String>> for NotificationMessage {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for NotificationMessage {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Which hosts may serve signing certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginPolicy {
    /// `https`, host `sns.*` ending in `.amazonaws.com` (or `.amazonaws.com.cn`).
    #[default]
    #[serde(rename = "aws")]
    AwsSns,

    /// `https`, host starting with `sns` and NOT ending in `amazonaws.com`.
    ///
    /// Kept for deployments that relied on the historical check, which rejects
    /// genuine AWS hosts.
    #[serde(rename = "legacy")]
    Legacy,
}

impl FromStr for OriginPolicy {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" | "aws-sns" => Ok(Self::AwsSns),
            "legacy" => Ok(Self::Legacy),
            other => Err(VerifyError::Config {
                message: format!("unknown origin policy: {}", other),
            }),
        }
    }
}

/// Policy properties for the verifier.
///
/// `debug` and `max_lifetime` are raw property strings and may contain
/// `{variable}` / `{variable:default}` references resolved per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Debug flag expression (`true` enables diagnostics).
    #[serde(default)]
    pub debug: Option<String>,

    /// Maximum message lifetime expression (e.g. `60`, `5m`, `1h`, `-1`).
    #[serde(default)]
    pub max_lifetime: Option<String>,

    /// Prefix for published diagnostic variables.
    #[serde(default = "default_variable_prefix")]
    pub variable_prefix: String,
}

fn default_variable_prefix() -> String {
    "awssns_".to_string()
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            debug: None,
            max_lifetime: None,
            variable_prefix: default_variable_prefix(),
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SNS_VERIFY_DEBUG` | Debug flag expression |
    /// | `SNS_VERIFY_MAX_LIFETIME` | Max lifetime expression |
    /// | `SNS_VERIFY_VAR_PREFIX` | Variable prefix |
    pub fn from_env() -> Self {
        Self {
            debug: std::env::var("SNS_VERIFY_DEBUG").ok(),
            max_lifetime: std::env::var("SNS_VERIFY_MAX_LIFETIME").ok(),
            variable_prefix: std::env::var("SNS_VERIFY_VAR_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_variable_prefix),
        }
    }

    /// Parse from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> VerifyResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| VerifyError::Config {
            message: format!("invalid verifier config: {}", e),
        })
    }

    /// Set the debug expression.
    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }

    /// Set the max lifetime expression.
    pub fn with_max_lifetime(mut self, max_lifetime: impl Into<String>) -> Self {
        self.max_lifetime = Some(max_lifetime.into());
        self
    }

    pub fn with_variable_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.variable_prefix = prefix.into();
        self
    }
}

/// Certificate store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertStoreConfig {
    /// How long a fetched certificate stays cached, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of cached certificates.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Certificate fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Origin validation rule for certificate URLs.
    #[serde(default)]
    pub origin_policy: OriginPolicy,
}

fn default_ttl() -> u64 {
    60 * 60
}

fn default_max_entries() -> usize {
    256
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for CertStoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
            fetch_timeout_secs: default_fetch_timeout(),
            origin_policy: OriginPolicy::default(),
        }
    }
}

impl CertStoreConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `SNS_VERIFY_CERT_TTL` | Cache TTL in seconds (default: 3600) |
    /// | `SNS_VERIFY_CERT_CACHE_SIZE` | Max cached certificates (default: 256) |
    /// | `SNS_VERIFY_FETCH_TIMEOUT` | Fetch timeout in seconds (default: 10) |
    /// | `SNS_VERIFY_ORIGIN_POLICY` | `aws` (default) or `legacy` |
    ///
    /// Unparseable values fall back to the defaults, except the origin policy,
    /// which must be valid. The result is checked with [`Self::validate`].
    pub fn from_env() -> VerifyResult<Self> {
        let origin_policy = match std::env::var("SNS_VERIFY_ORIGIN_POLICY") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => OriginPolicy::default(),
        };

        let config = Self {
            ttl_secs: std::env::var("SNS_VERIFY_CERT_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_ttl),
            max_entries: std::env::var("SNS_VERIFY_CERT_CACHE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_entries),
            fetch_timeout_secs: std::env::var("SNS_VERIFY_FETCH_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_fetch_timeout),
            origin_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> VerifyResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| VerifyError::Config {
            message: format!("invalid certificate store config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot run with.
    ///
    /// A zero fetch timeout would fail every certificate load.
    pub fn validate(&self) -> VerifyResult<()> {
        if self.fetch_timeout_secs == 0 {
            return Err(VerifyError::Config {
                message: "fetch_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Set the cache TTL.
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_message_type_classification() {
        assert_eq!(
            MessageType::from_type_field(Some("Notification")),
            MessageType::Notification
        );
        assert_eq!(
            MessageType::from_type_field(Some("UnsubscribeConfirmation")),
            MessageType::UnsubscribeConfirmation
        );
        assert_eq!(
            MessageType::from_type_field(Some("notification")),
            MessageType::Unknown
        );
        assert_eq!(MessageType::from_type_field(None), MessageType::Unknown);
        assert!(MessageType::SubscriptionConfirmation.is_subscription());
        assert!(!MessageType::Notification.is_subscription());
    }

    #[test]
    fn test_from_json_flat_object() {
        let msg = NotificationMessage::from_json(
            r#"{"Type":"Notification","Message":"Hello world!","Subject":""}"#,
        )
        .unwrap();
        assert_eq!(msg.message_type(), MessageType::Notification);
        assert_eq!(msg.get("Message"), Some("Hello world!"));
        assert_eq!(msg.get("Subject"), Some(""));
        assert_eq!(msg.len(), 3);
    }

    #[test]
    fn test_from_json_rejects_nested_and_non_object() {
        for payload in [
            r#"{"Type":"Notification","Message":{"nested":"value"}}"#,
            r#"{"Type":"Notification","Count":3}"#,
            r#"{"Type":null}"#,
            r#"["Type","Notification"]"#,
            "not json at all",
            "",
        ] {
            let err = NotificationMessage::from_json(payload).unwrap_err();
            assert!(
                matches!(err, VerifyError::MalformedPayload { .. }),
                "payload {:?} should be malformed, got {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_origin_policy_parse() {
        assert_eq!("aws".parse::<OriginPolicy>().unwrap(), OriginPolicy::AwsSns);
        assert_eq!(
            " Legacy ".parse::<OriginPolicy>().unwrap(),
            OriginPolicy::Legacy
        );
        assert!(matches!(
            "lenient".parse::<OriginPolicy>(),
            Err(VerifyError::Config { .. })
        ));
    }

    #[test]
    fn test_config_from_yaml() {
        let cfg = VerifierConfig::from_yaml_str("debug: \"{flow.debug:false}\"\nmax_lifetime: 5m\n")
            .unwrap();
        assert_eq!(cfg.debug.as_deref(), Some("{flow.debug:false}"));
        assert_eq!(cfg.max_lifetime.as_deref(), Some("5m"));
        assert_eq!(cfg.variable_prefix, "awssns_");

        let store = CertStoreConfig::from_yaml_str("ttl_secs: 120\norigin_policy: legacy\n").unwrap();
        assert_eq!(store.ttl_secs, 120);
        assert_eq!(store.max_entries, 256);
        assert_eq!(store.origin_policy, OriginPolicy::Legacy);
    }

    #[test]
    #[serial]
    fn test_store_config_from_env() {
        std::env::set_var("SNS_VERIFY_CERT_TTL", "30");
        std::env::set_var("SNS_VERIFY_CERT_CACHE_SIZE", "not-a-number");
        std::env::set_var("SNS_VERIFY_ORIGIN_POLICY", "legacy");

        let cfg = CertStoreConfig::from_env().unwrap();
        assert_eq!(cfg.ttl_secs, 30);
        assert_eq!(cfg.max_entries, 256);
        assert_eq!(cfg.fetch_timeout_secs, 10);
        assert_eq!(cfg.origin_policy, OriginPolicy::Legacy);

        std::env::set_var("SNS_VERIFY_ORIGIN_POLICY", "bogus");
        assert!(CertStoreConfig::from_env().is_err());

        std::env::remove_var("SNS_VERIFY_CERT_TTL");
        std::env::remove_var("SNS_VERIFY_CERT_CACHE_SIZE");
        std::env::remove_var("SNS_VERIFY_ORIGIN_POLICY");
    }

    #[test]
    fn test_zero_fetch_timeout_rejected() {
        let err = CertStoreConfig::from_yaml_str("fetch_timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, VerifyError::Config { .. }), "{:?}", err);

        assert!(CertStoreConfig::default().validate().is_ok());
        assert!(CertStoreConfig::default()
            .with_fetch_timeout_secs(0)
            .validate()
            .is_err());
    }

    #[test]
    #[serial]
    fn test_zero_fetch_timeout_from_env_rejected() {
        std::env::set_var("SNS_VERIFY_FETCH_TIMEOUT", "0");
        let result = CertStoreConfig::from_env();
        std::env::remove_var("SNS_VERIFY_FETCH_TIMEOUT");

        assert!(matches!(result, Err(VerifyError::Config { .. })));
    }

    #[test]
    #[serial]
    fn test_verifier_config_from_env() {
        std::env::set_var("SNS_VERIFY_MAX_LIFETIME", "1h");
        std::env::set_var("SNS_VERIFY_VAR_PREFIX", "");

        let cfg = VerifierConfig::from_env();
        assert_eq!(cfg.max_lifetime.as_deref(), Some("1h"));
        assert_eq!(cfg.variable_prefix, "awssns_");

        std::env::remove_var("SNS_VERIFY_MAX_LIFETIME");
        std::env::remove_var("SNS_VERIFY_VAR_PREFIX");
    }
}
