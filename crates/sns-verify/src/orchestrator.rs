//! Per-message verification pipeline.
//!
//! One pass per message:
//!
//! ```text
//! Start -> FieldsChecked -> SignatureChecked -> FreshnessChecked -> Accepted
//!   \            \                 \                  \
//!    +------------+-----------------+------------------+--> Rejected
//! ```
//!
//! Every failure is turned into a [`Verdict`] with a stable error code at this
//! boundary. The certificate store is the only state shared between messages.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cert_store::CertificateStore;
use crate::context::{vars, MessageContext};
use crate::error::{FieldProblem, VerifyError, VerifyResult};
use crate::freshness::{check_freshness, MaxLifetime};
use crate::template;
use crate::types::{
    fields, MessageType, NotificationMessage, VerifierConfig, SUPPORTED_SIGNATURE_VERSION,
};
use crate::verify::SignatureVerifier;

/// Fields every message must carry, in reporting order.
const REQUIRED_FIELDS: &[&str] = &[
    fields::MESSAGE,
    fields::MESSAGE_ID,
    fields::TIMESTAMP,
    fields::TOPIC_ARN,
    fields::TYPE,
    fields::SIGNING_CERT_URL,
    fields::SIGNATURE_VERSION,
    fields::SIGNATURE,
];

/// Additionally required for subscription and unsubscribe confirmations.
const SUBSCRIPTION_REQUIRED_FIELDS: &[&str] = &[fields::SUBSCRIBE_URL, fields::TOKEN];

/// Published variable names, relative to the configured prefix.
mod outputs {
    pub const ERROR: &str = "error";
    pub const EXCEPTION: &str = "exception";
    pub const STACKTRACE: &str = "stacktrace";
    pub const SECONDS_REMAINING: &str = "seconds_remaining";

    pub const ALL: &[&str] = &[ERROR, EXCEPTION, STACKTRACE, SECONDS_REMAINING];
}

/// Pipeline stage reached by a verification pass.
///
/// A pass walks the checked stages in order and ends in `Accepted` or
/// `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    FieldsChecked,
    SignatureChecked,
    FreshnessChecked,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Abort,
}

/// Result of one [`NotificationVerifier::execute`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Terminal stage: `Accepted` or `Rejected`.
    pub stage: Stage,
    /// Last check the message passed before the terminal stage.
    pub last_passed: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Seconds left in the freshness window; absent when the check is disabled
    /// or was never reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<i64>,
}

impl Verdict {
    fn accepted(seconds_remaining: Option<i64>, last_passed: Stage) -> Self {
        Self {
            outcome: Outcome::Success,
            stage: Stage::Accepted,
            last_passed,
            error_code: None,
            seconds_remaining,
        }
    }

    fn rejected(err: &VerifyError, last_passed: Stage) -> Self {
        let seconds_remaining = match err {
            VerifyError::Expired { seconds_remaining } => Some(*seconds_remaining),
            _ => None,
        };
        Self {
            outcome: Outcome::Abort,
            stage: Stage::Rejected,
            last_passed,
            error_code: Some(err.code()),
            seconds_remaining,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// A message that passed every check.
#[derive(Debug, Clone)]
pub struct VerifiedNotification {
    message: NotificationMessage,
    seconds_remaining: Option<i64>,
}

impl VerifiedNotification {
    pub fn message(&self) -> &NotificationMessage {
        &self.message
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    pub fn seconds_remaining(&self) -> Option<i64> {
        self.seconds_remaining
    }

    pub fn into_message(self) -> NotificationMessage {
        self.message
    }
}

/// Verifies inbound SNS messages.
///
/// Cheap to clone; clones share the certificate store.
#[derive(Debug, Clone)]
pub struct NotificationVerifier {
    signatures: SignatureVerifier,
    config: VerifierConfig,
}

impl NotificationVerifier {
    pub fn new(store: CertificateStore, config: VerifierConfig) -> Self {
        Self {
            signatures: SignatureVerifier::new(store),
            config,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn store(&self) -> &CertificateStore {
        self.signatures.store()
    }

    /// Verify a raw JSON body.
    ///
    /// Property references in the config resolve to their defaults since there
    /// is no pipeline scope to look them up in.
    pub async fn verify_payload(&self, payload: &str) -> VerifyResult<VerifiedNotification> {
        let message = NotificationMessage::from_json(payload)?;
        self.verify_message(&message).await
    }

    /// Verify an already-decoded message.
    pub async fn verify_message(
        &self,
        message: &NotificationMessage,
    ) -> VerifyResult<VerifiedNotification> {
        check_fields(message)?;
        self.signatures.verify(message).await?;

        let max_lifetime = self.max_lifetime(|_| None)?;
        let seconds_remaining = freshness(message, max_lifetime)?;

        Ok(VerifiedNotification {
            message: message.clone(),
            seconds_remaining,
        })
    }

    /// Run one verification pass against a pipeline context.
    ///
    /// Reads the message-type header and the request body from `ctx` and
    /// publishes results back into it:
    ///
    /// - `<prefix>error`: stable error code on rejection
    /// - `<prefix>exception`: error message, for failures past the field checks
    /// - `<prefix>stacktrace`: error with its cause chain, debug mode only
    /// - `<prefix>seconds_remaining`: freshness window left, when checked
    /// - `notification.<Field>`: every field, once the signature is verified
    ///
    /// Never panics and never returns an error: every failure becomes an
    /// [`Outcome::Abort`] verdict.
    pub async fn execute(&self, ctx: &mut dyn MessageContext) -> Verdict {
        for name in outputs::ALL {
            ctx.remove_variable(&self.var_name(name));
        }
        let debug_mode = self.debug_enabled(|name| ctx.get_variable(name));

        let mut last_passed = Stage::Start;
        match self.run(ctx, &mut last_passed).await {
            Ok(verified) => {
                let verdict = Verdict::accepted(verified.seconds_remaining, last_passed);
                debug!(
                    stage = ?verdict.stage,
                    message_type = ?verified.message_type(),
                    seconds_remaining = ?verified.seconds_remaining(),
                    "notification accepted"
                );
                verdict
            }
            Err(err) => {
                let verdict = Verdict::rejected(&err, last_passed);
                warn!(
                    stage = ?verdict.stage,
                    last_passed = ?verdict.last_passed,
                    code = %err.code(),
                    error = %err,
                    "notification rejected"
                );
                self.publish_error(ctx, &err, debug_mode);
                verdict
            }
        }
    }

    async fn run(
        &self,
        ctx: &mut dyn MessageContext,
        stage: &mut Stage,
    ) -> VerifyResult<VerifiedNotification> {
        ctx.get_variable(vars::MESSAGE_TYPE_HEADER)
            .filter(|v| !v.is_empty())
            .ok_or(VerifyError::NoNotification)?;

        let payload = ctx.get_variable(vars::REQUEST_CONTENT).unwrap_or_default();
        let message = NotificationMessage::from_json(&payload)?;

        check_fields(&message)?;
        *stage = Stage::FieldsChecked;

        self.signatures.verify(&message).await?;
        *stage = Stage::SignatureChecked;

        for (name, value) in message.iter() {
            ctx.set_variable(
                &format!("{}{}", vars::NOTIFICATION_PREFIX, name),
                value.to_string(),
            );
        }

        let max_lifetime = self.max_lifetime(|name| ctx.get_variable(name))?;
        let seconds_remaining = match freshness(&message, max_lifetime) {
            Err(VerifyError::Expired { seconds_remaining }) => {
                self.publish_seconds_remaining(ctx, seconds_remaining);
                return Err(VerifyError::Expired { seconds_remaining });
            }
            result => result?,
        };
        if let Some(secs) = seconds_remaining {
            self.publish_seconds_remaining(ctx, secs);
        }
        *stage = Stage::FreshnessChecked;

        Ok(VerifiedNotification {
            message,
            seconds_remaining,
        })
    }

    /// Resolve the configured max lifetime. Unset or blank means the default.
    fn max_lifetime<F>(&self, lookup: F) -> VerifyResult<MaxLifetime>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.config.max_lifetime.as_deref().map(str::trim) {
            None | Some("") => Ok(MaxLifetime::default()),
            Some(raw) => MaxLifetime::parse(&template::resolve(raw, lookup)),
        }
    }

    fn debug_enabled<F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.config.debug.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(raw) => template::resolve(raw, lookup)
                .trim()
                .eq_ignore_ascii_case("true"),
        }
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.config.variable_prefix, name)
    }

    fn publish_seconds_remaining(&self, ctx: &mut dyn MessageContext, secs: i64) {
        ctx.set_variable(&self.var_name(outputs::SECONDS_REMAINING), secs.to_string());
    }

    fn publish_error(&self, ctx: &mut dyn MessageContext, err: &VerifyError, debug_mode: bool) {
        ctx.set_variable(&self.var_name(outputs::ERROR), err.code());

        // Rejections decided by plain checks carry only the code.
        let checked = matches!(
            err,
            VerifyError::NoNotification
                | VerifyError::MissingFields { .. }
                | VerifyError::Expired { .. }
        );
        if checked {
            return;
        }

        ctx.set_variable(
            &self.var_name(outputs::EXCEPTION),
            err.to_string().replace('\n', " "),
        );
        if debug_mode {
            ctx.set_variable(&self.var_name(outputs::STACKTRACE), err.diagnostic());
        }
    }
}

/// Report every missing required field, plus an unsupported `SignatureVersion`.
fn check_fields(message: &NotificationMessage) -> VerifyResult<()> {
    let conditional: &[&'static str] = if message.message_type().is_subscription() {
        SUBSCRIPTION_REQUIRED_FIELDS
    } else {
        &[]
    };

    let mut problems: Vec<FieldProblem> = REQUIRED_FIELDS
        .iter()
        .chain(conditional)
        .copied()
        .filter(|name| !message.contains(name))
        .map(FieldProblem::Missing)
        .collect();

    if let Some(version) = message.get(fields::SIGNATURE_VERSION) {
        if version != SUPPORTED_SIGNATURE_VERSION {
            problems.push(FieldProblem::UnsupportedSignatureVersion(version.to_string()));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::MissingFields { problems })
    }
}

fn freshness(
    message: &NotificationMessage,
    max_lifetime: MaxLifetime,
) -> VerifyResult<Option<i64>> {
    // Presence was established by check_fields.
    let timestamp = message.get(fields::TIMESTAMP).unwrap_or_default();
    check_freshness(timestamp, max_lifetime, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InMemoryContext;
    use crate::types::CertStoreConfig;
    use std::sync::Arc;

    use crate::cert_store::CertificateFetcher;

    #[derive(Debug)]
    struct NoNetwork;

    #[async_trait::async_trait]
    impl CertificateFetcher for NoNetwork {
        async fn fetch(&self, url: &str) -> VerifyResult<Vec<u8>> {
            Err(VerifyError::Fetch {
                url: url.to_string(),
                message: "network disabled".to_string(),
            })
        }
    }

    fn verifier(config: VerifierConfig) -> NotificationVerifier {
        let store = CertificateStore::with_fetcher(CertStoreConfig::default(), Arc::new(NoNetwork));
        NotificationVerifier::new(store, config)
    }

    fn complete() -> NotificationMessage {
        NotificationMessage::default()
            .with_field("Type", "Notification")
            .with_field("Message", "Hello world!")
            .with_field("MessageId", "22b80b92-fdea-4c2c-8f9d-bdfb0c7bf324")
            .with_field("Timestamp", "2012-05-02T00:54:06.655Z")
            .with_field("TopicArn", "arn:aws:sns:us-west-2:123456789012:MyTopic")
            .with_field("SignatureVersion", "1")
            .with_field("Signature", "AAAA")
            .with_field("SigningCertURL", "https://sns.us-west-2.amazonaws.com/cert.pem")
    }

    #[test]
    fn test_check_fields_lists_every_missing_field() {
        let msg = NotificationMessage::default()
            .with_field("Type", "Notification")
            .with_field("Message", "hi");
        let err = check_fields(&msg).unwrap_err();
        assert_eq!(
            err.code(),
            "Missing-MessageId,Missing-Timestamp,Missing-TopicArn,Missing-SigningCertURL,\
             Missing-SignatureVersion,Missing-Signature"
        );
    }

    #[test]
    fn test_check_fields_subscription_requires_token_and_url() {
        let msg = complete().with_field("Type", "SubscriptionConfirmation");
        assert_eq!(
            check_fields(&msg).unwrap_err().code(),
            "Missing-SubscribeURL,Missing-Token"
        );
        assert!(check_fields(&complete()).is_ok());
    }

    #[test]
    fn test_check_fields_signature_version() {
        let msg = complete().with_field("SignatureVersion", "2");
        assert_eq!(
            check_fields(&msg).unwrap_err().code(),
            "Unsupported-Signature-Version"
        );

        let mut fields: std::collections::BTreeMap<String, String> =
            complete().iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        fields.remove("Message");
        fields.insert("SignatureVersion".into(), "2".into());
        assert_eq!(
            check_fields(&NotificationMessage::from(fields)).unwrap_err().code(),
            "Missing-Message,Unsupported-Signature-Version"
        );
    }

    #[test]
    fn test_debug_flag_resolution() {
        let v = verifier(VerifierConfig::default());
        assert!(!v.debug_enabled(|_| None));

        let v = verifier(VerifierConfig::default().with_debug(" TRUE "));
        assert!(v.debug_enabled(|_| None));

        let v = verifier(VerifierConfig::default().with_debug("{flow.debug:false}"));
        assert!(!v.debug_enabled(|_| None));
        assert!(v.debug_enabled(|name| (name == "flow.debug").then(|| "true".to_string())));

        let v = verifier(VerifierConfig::default().with_debug("yes"));
        assert!(!v.debug_enabled(|_| None));
    }

    #[test]
    fn test_max_lifetime_resolution() {
        let v = verifier(VerifierConfig::default());
        assert_eq!(v.max_lifetime(|_| None).unwrap(), MaxLifetime::Seconds(60));

        let v = verifier(VerifierConfig::default().with_max_lifetime("  "));
        assert_eq!(v.max_lifetime(|_| None).unwrap(), MaxLifetime::Seconds(60));

        let v = verifier(VerifierConfig::default().with_max_lifetime("{ttl:2m}"));
        assert_eq!(v.max_lifetime(|_| None).unwrap(), MaxLifetime::Seconds(120));
        assert_eq!(
            v.max_lifetime(|_| Some("-1".to_string())).unwrap(),
            MaxLifetime::Disabled
        );
        // Unset reference without default resolves to blank: the default lifetime.
        let v = verifier(VerifierConfig::default().with_max_lifetime("{ttl}"));
        assert_eq!(v.max_lifetime(|_| None).unwrap(), MaxLifetime::Seconds(60));

        let v = verifier(VerifierConfig::default().with_max_lifetime("forever"));
        assert!(matches!(
            v.max_lifetime(|_| None),
            Err(VerifyError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_clears_previous_outputs() {
        let v = verifier(VerifierConfig::default());
        let mut ctx = InMemoryContext::for_request(None, "")
            .with_variable("awssns_exception", "stale")
            .with_variable("awssns_stacktrace", "stale")
            .with_variable("awssns_seconds_remaining", "12");

        let verdict = v.execute(&mut ctx).await;

        assert_eq!(verdict.error_code.as_deref(), Some("No-SNS-Message-Found"));
        assert_eq!(verdict.stage, Stage::Rejected);
        assert_eq!(verdict.last_passed, Stage::Start);
        assert_eq!(ctx.get("awssns_error"), Some("No-SNS-Message-Found"));
        assert_eq!(ctx.get("awssns_exception"), None);
        assert_eq!(ctx.get("awssns_stacktrace"), None);
        assert_eq!(ctx.get("awssns_seconds_remaining"), None);
    }

    #[tokio::test]
    async fn test_execute_fetch_failure_is_signature_failure() {
        let v = verifier(VerifierConfig::default().with_debug("true"));
        let body = serde_json::to_string(&complete()).unwrap();
        let mut ctx = InMemoryContext::for_request(Some("Notification"), &body);

        let verdict = v.execute(&mut ctx).await;

        assert_eq!(verdict.outcome, Outcome::Abort);
        assert_eq!(verdict.stage, Stage::Rejected);
        assert_eq!(verdict.last_passed, Stage::FieldsChecked);
        assert_eq!(
            verdict.error_code.as_deref(),
            Some("Signature-Verification-Failed")
        );
        assert!(ctx.get("awssns_exception").unwrap().contains("signature verification failed"));
        let trace = ctx.get("awssns_stacktrace").unwrap();
        assert!(trace.contains("caused by: failed to fetch certificate"), "{}", trace);
        assert!(ctx.get("notification.Message").is_none());
    }

    #[tokio::test]
    async fn test_custom_prefix() {
        let v = verifier(VerifierConfig::default().with_variable_prefix("sns."));
        let mut ctx = InMemoryContext::for_request(Some("Notification"), "[1, 2]");

        let verdict = v.execute(&mut ctx).await;

        assert_eq!(verdict.error_code.as_deref(), Some("Malformed-Payload"));
        assert_eq!(ctx.get("sns.error"), Some("Malformed-Payload"));
        assert!(ctx.get("sns.exception").is_some());
        // Not in debug mode.
        assert!(ctx.get("sns.stacktrace").is_none());
    }

    #[test]
    fn test_verdict_serializes_compactly() {
        let json = serde_json::to_value(Verdict::accepted(None, Stage::FreshnessChecked)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "outcome": "success",
                "stage": "accepted",
                "last_passed": "freshness_checked"
            })
        );

        let err = VerifyError::Expired { seconds_remaining: -5 };
        let json = serde_json::to_value(Verdict::rejected(&err, Stage::SignatureChecked)).unwrap();
        assert_eq!(json["stage"], "rejected");
        assert_eq!(json["last_passed"], "signature_checked");
        assert_eq!(json["seconds_remaining"], -5);
    }
}
