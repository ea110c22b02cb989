//! Error types for notification verification.

use std::error::Error as _;
use std::fmt;

/// One problem found while checking the required fields of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    /// A required field is absent.
    Missing(&'static str),

    /// `SignatureVersion` is present but not `"1"`.
    UnsupportedSignatureVersion(String),
}

impl FieldProblem {
    /// Stable code for this problem (`Missing-Message`, `Unsupported-Signature-Version`).
    pub fn code(&self) -> String {
        match self {
            Self::Missing(field) => format!("Missing-{}", field),
            Self::UnsupportedSignatureVersion(_) => "Unsupported-Signature-Version".to_string(),
        }
    }
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "missing field {}", field),
            Self::UnsupportedSignatureVersion(v) => {
                write!(f, "unsupported signature version {:?}", v)
            }
        }
    }
}

/// Coarse error classification used by callers that only need the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingField,
    UntrustedOrigin,
    Fetch,
    Parse,
    Security,
    Expired,
    Config,
}

/// Verification errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The message-type header is absent or empty.
    #[error("no SNS message found")]
    NoNotification,

    /// The body is not a flat JSON object of string values.
    #[error("malformed notification payload: {message}")]
    MalformedPayload { message: String },

    /// Required fields are missing, or the signature version is unsupported.
    #[error("notification failed field checks: {}", join_problems(.problems))]
    MissingFields { problems: Vec<FieldProblem> },

    /// The signing certificate URL failed origin validation.
    #[error("untrusted certificate origin {url}: {reason}")]
    UntrustedOrigin { url: String, reason: String },

    /// The signing certificate could not be retrieved.
    #[error("failed to fetch certificate from {url}: {message}")]
    Fetch { url: String, message: String },

    /// The retrieved bytes are not a usable RSA certificate.
    #[error("invalid certificate from {url}: {message}")]
    CertificateParse { url: String, message: String },

    /// Signature verification failed (every sub-failure of the signature stage lands here).
    #[error("signature verification failed: {reason}")]
    Signature {
        reason: String,
        #[source]
        source: Option<Box<VerifyError>>,
    },

    /// The `Timestamp` field is not an RFC 3339 instant.
    #[error("invalid timestamp {value:?}: {message}")]
    InvalidTimestamp { value: String, message: String },

    /// The freshness window has elapsed.
    #[error("the message is expired ({seconds_remaining}s remaining)")]
    Expired { seconds_remaining: i64 },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

fn join_problems(problems: &[FieldProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl VerifyError {
    /// Stable, machine-readable code published as the pipeline error variable.
    pub fn code(&self) -> String {
        match self {
            Self::NoNotification => "No-SNS-Message-Found".to_string(),
            Self::MalformedPayload { .. } => "Malformed-Payload".to_string(),
            Self::MissingFields { problems } => problems
                .iter()
                .map(FieldProblem::code)
                .collect::<Vec<_>>()
                .join(","),
            Self::UntrustedOrigin { .. } => "Untrusted-Certificate-Origin".to_string(),
            Self::Fetch { .. } => "Certificate-Fetch-Failed".to_string(),
            Self::CertificateParse { .. } => "Certificate-Parse-Failed".to_string(),
            Self::Signature { .. } => "Signature-Verification-Failed".to_string(),
            Self::InvalidTimestamp { .. } => "Invalid-Timestamp".to_string(),
            Self::Expired { .. } => "Message-Expired".to_string(),
            Self::Config { .. } => "Invalid-Configuration".to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoNotification | Self::MissingFields { .. } => ErrorKind::MissingField,
            Self::UntrustedOrigin { .. } => ErrorKind::UntrustedOrigin,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::MalformedPayload { .. }
            | Self::CertificateParse { .. }
            | Self::InvalidTimestamp { .. } => ErrorKind::Parse,
            Self::Signature { .. } => ErrorKind::Security,
            Self::Expired { .. } => ErrorKind::Expired,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Whether a later redelivery of the same message could succeed.
    ///
    /// Nothing inside this crate retries; this is a hint for the pipeline.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { .. } => true,
            Self::Signature {
                source: Some(inner),
                ..
            } => inner.is_transient(),
            _ => false,
        }
    }

    /// Wrap a lower-level failure as a signature-stage failure.
    pub(crate) fn signature(reason: impl Into<String>, source: Option<VerifyError>) -> Self {
        Self::Signature {
            reason: reason.into(),
            source: source.map(Box::new),
        }
    }

    /// Render the error together with its source chain.
    ///
    /// This is what debug mode publishes in place of a stack trace.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("{}: {}", self.code(), self);
        let mut source = self.source();
        while let Some(err) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&err.to_string());
            source = err.source();
        }
        out
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Self::Fetch { url, message }
    }
}

/// Result type for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
