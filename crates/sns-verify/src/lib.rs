//! Signature verification for Amazon SNS push messages.
//!
//! This crate authenticates HTTP(S) deliveries from SNS before they are
//! trusted, providing:
//!
//! - Canonical string-to-sign per message type
//! - Signing certificate retrieval with origin validation
//! - Concurrency-safe certificate cache with TTL and hit/miss statistics
//! - RSA/SHA-1 signature verification (`SignatureVersion` 1)
//! - Freshness window enforcement
//! - Pipeline integration through a variable-scoped [`MessageContext`]
//!
//! # Quick Start
//!
//! ```no_run
//! use sns_verify::{CertificateStore, NotificationVerifier, VerifierConfig};
//!
//! # async fn example(body: &str) -> anyhow::Result<()> {
//! // Construct once at startup and share between workers
//! let store = CertificateStore::from_env()?;
//! let verifier = NotificationVerifier::new(store, VerifierConfig::from_env());
//!
//! // Verify one delivery
//! let verified = verifier.verify_payload(body).await?;
//! println!("accepted {:?} message", verified.message_type());
//! # Ok(())
//! # }
//! ```
//!
//! # Pipeline use
//!
//! [`NotificationVerifier::execute`] reads `request.header.x-amz-sns-message-type`
//! and `request.content` from a [`MessageContext`] and publishes the verdict
//! back into it (`awssns_error`, `awssns_seconds_remaining`,
//! `notification.<Field>`, ...). It never fails; every problem becomes an
//! [`Outcome::Abort`] verdict with a stable error code.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `SNS_VERIFY_DEBUG` | Publish error diagnostics when it resolves to `true` |
//! | `SNS_VERIFY_MAX_LIFETIME` | Max message age, e.g. `90`, `5m`, `1h`; `-1` disables (default: 60s) |
//! | `SNS_VERIFY_VAR_PREFIX` | Prefix for published variables (default: `awssns_`) |
//! | `SNS_VERIFY_CERT_TTL` | Certificate cache TTL in seconds (default: 3600) |
//! | `SNS_VERIFY_CERT_CACHE_SIZE` | Max cached certificates (default: 256) |
//! | `SNS_VERIFY_FETCH_TIMEOUT` | Certificate fetch timeout in seconds (default: 10) |
//! | `SNS_VERIFY_ORIGIN_POLICY` | `aws` (default) or `legacy` |

pub mod canonicalize;
pub mod cert_store;
pub mod context;
pub mod error;
pub mod freshness;
pub mod orchestrator;
pub mod template;
pub mod types;
pub mod verify;

// Re-export main types
pub use cert_store::{
    CacheStats, CertificateFetcher, CertificateStore, HttpFetcher, SigningCertificate,
};
pub use context::{InMemoryContext, MessageContext};
pub use error::{ErrorKind, FieldProblem, VerifyError, VerifyResult};
pub use freshness::MaxLifetime;
pub use orchestrator::{NotificationVerifier, Outcome, Stage, VerifiedNotification, Verdict};
pub use types::{CertStoreConfig, MessageType, NotificationMessage, OriginPolicy, VerifierConfig};
pub use verify::SignatureVerifier;
