//! Token-cached document-signing workflow
//!
//! Sequences the calls a caller (typically a UI) needs to get a signed policy
//! document: authenticate, submit for signing, wait for the provider to settle,
//! then resolve a time-limited download URL. Remote calls go through a
//! `provider::SigningProvider`, normally the same-origin proxy.
//!
//! Components, leaf to root:
//! 1. `TokenCache` holds one bearer token with expiry and a single-flight guard
//! 2. `AuthClient` fills the cache from the provider on a miss
//! 3. `DocumentSigner` submits a document, rejecting duplicate idempotency keys
//! 4. `DownloadResolver` polls for the download URL with bounded backoff
//! 5. `Orchestrator` runs the linear state machine and reports progress
//!
//! `ConsentCollector` registers consent with the consent API using the same
//! token cache type.

pub mod auth;
pub mod cache;
pub mod consent;
pub mod document;
pub mod error;
pub mod poll;
pub mod progress;
pub mod resolver;
pub mod signer;
pub mod telemetry;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::AuthClient;
pub use cache::{CachedToken, EXPIRY_SAFETY_MARGIN, TokenCache};
pub use consent::{ConsentCollector, ConsentSettings, Principal};
pub use document::{POLICY_PAGE_COUNT, PolicyDocument, policy_signature_coordinates};
pub use error::{AuthError, ConsentError, ResolveError, SignError, WorkflowError};
pub use poll::{Attempt, PollError, PollPolicy, poll_until};
pub use progress::{NoopObserver, ProgressEvent, ProgressObserver};
pub use resolver::DownloadResolver;
pub use signer::{DocumentSigner, IdempotencyKey, SignRequest};
pub use workflow::{
    Orchestrator, SuppliedDocument, WorkflowConfig, WorkflowFailure, WorkflowRequest,
    WorkflowStage,
};
