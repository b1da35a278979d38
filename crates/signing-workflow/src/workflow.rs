//! Workflow orchestrator
//!
//! Drives one signing run through a linear state machine:
//!
//! ```text
//! Idle -> Generating -> Signing -> Settling -> Resolving -> Done
//!              \___________\___________\___________\-----> Failed
//! ```
//!
//! Each run is a sequential chain of awaits. Nothing is retried at this level
//! (the resolver's bounded poll is the only repetition); a failed run is
//! reported with the stage it failed in, and the caller may start a new run.
//! A restarted run whose idempotency key was already accepted by the provider
//! does not sign again: it resumes at `Settling` with the recorded document id.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use provider::SigningProvider;
use signstation::SignatureCoordinate;
use tracing::{info, instrument, warn};

use crate::auth::AuthClient;
use crate::cache::TokenCache;
use crate::document::{PolicyDocument, policy_signature_coordinates};
use crate::error::{SignError, WorkflowError};
use crate::poll::PollPolicy;
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::resolver::DownloadResolver;
use crate::signer::{DocumentSigner, IdempotencyKey, SignRequest};
use crate::telemetry;

/// Stage of a signing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStage {
    Idle,
    Generating,
    Signing,
    Settling,
    Resolving,
    Done,
    Failed,
}

impl WorkflowStage {
    pub fn label(self) -> &'static str {
        match self {
            WorkflowStage::Idle => "Ready",
            WorkflowStage::Generating => "Generating your policy document...",
            WorkflowStage::Signing => "Digitally signing your policy...",
            WorkflowStage::Settling => "Waiting for the signed document...",
            WorkflowStage::Resolving => "Preparing download...",
            WorkflowStage::Done => "Complete!",
            WorkflowStage::Failed => "Signing failed",
        }
    }

    /// Successor on the happy path.
    pub fn next(self) -> Option<WorkflowStage> {
        match self {
            WorkflowStage::Idle => Some(WorkflowStage::Generating),
            WorkflowStage::Generating => Some(WorkflowStage::Signing),
            WorkflowStage::Signing => Some(WorkflowStage::Settling),
            WorkflowStage::Settling => Some(WorkflowStage::Resolving),
            WorkflowStage::Resolving => Some(WorkflowStage::Done),
            WorkflowStage::Done | WorkflowStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStage::Done | WorkflowStage::Failed)
    }

    pub fn can_transition_to(self, to: WorkflowStage) -> bool {
        if to == WorkflowStage::Failed {
            return !self.is_terminal() && self != WorkflowStage::Idle;
        }
        self.next() == Some(to)
    }

    fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::Idle => "idle",
            WorkflowStage::Generating => "generating",
            WorkflowStage::Signing => "signing",
            WorkflowStage::Settling => "settling",
            WorkflowStage::Resolving => "resolving",
            WorkflowStage::Done => "done",
            WorkflowStage::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for a run. All have working defaults.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Wait between a successful sign and the first download lookup
    pub settle_delay: Duration,
    pub poll: PollPolicy,
    /// Window used when deriving an idempotency key for a request without one
    pub idempotency_window: Duration,
    /// How long the signer remembers a key; at least two windows so the
    /// previous window's key is still known
    pub idempotency_retention: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            poll: PollPolicy::default(),
            idempotency_window: Duration::from_secs(5 * 60),
            idempotency_retention: Duration::from_secs(10 * 60),
        }
    }
}

/// A document the caller already has, with its signature placements.
#[derive(Debug, Clone)]
pub struct SuppliedDocument {
    pub bytes: Vec<u8>,
    pub name: String,
    pub signature_coordinates: Vec<SignatureCoordinate>,
}

#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub signer_name: String,
    /// When absent the placeholder policy is rendered for the signer.
    pub document: Option<SuppliedDocument>,
    /// When absent one is derived from the document and signer.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl WorkflowRequest {
    pub fn for_signer(signer_name: impl Into<String>) -> Self {
        Self {
            signer_name: signer_name.into(),
            document: None,
            idempotency_key: None,
        }
    }

    pub fn with_document(mut self, document: SuppliedDocument) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// A run that ended in `Failed`.
#[derive(Debug, thiserror::Error)]
#[error("signing workflow failed while {stage}: {error}")]
pub struct WorkflowFailure {
    /// Stage that was active when the error occurred
    pub stage: WorkflowStage,
    #[source]
    pub error: WorkflowError,
    /// Provider document id, when the failure happened after signing
    pub document_id: Option<String>,
}

impl WorkflowFailure {
    /// Message fit for display to an end user.
    pub fn user_message(&self) -> &'static str {
        use crate::error::ResolveError;
        match &self.error {
            WorkflowError::Resolve(ResolveError::NotReady { .. }) => {
                "Your signed document is taking longer than expected. Please try again shortly."
            }
            _ => "We could not sign your policy document. Please try again.",
        }
    }
}

/// Runs signing workflows against one provider.
///
/// Holds the auth client, signer, and resolver for the provider, so the token
/// cache and the signer's idempotency ledger are shared across runs.
pub struct Orchestrator {
    signer: DocumentSigner,
    resolver: DownloadResolver,
    config: WorkflowConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn SigningProvider>,
        cache: Arc<TokenCache>,
        config: WorkflowConfig,
    ) -> Self {
        let auth = Arc::new(AuthClient::new(provider.clone(), cache));
        Self {
            signer: DocumentSigner::new(auth.clone(), provider.clone())
                .with_retention(config.idempotency_retention),
            resolver: DownloadResolver::new(auth, provider, config.poll.clone()),
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run one workflow to completion, returning the signed document's
    /// download URL.
    #[instrument(skip_all, fields(signer = %request.signer_name))]
    pub async fn run(
        &self,
        request: WorkflowRequest,
        observer: &dyn ProgressObserver,
    ) -> Result<String, WorkflowFailure> {
        let mut run = Run {
            stage: WorkflowStage::Idle,
            observer,
            document_id: None,
        };

        let result = self.execute(&mut run, request).await;
        match result {
            Ok(url) => {
                run.advance(WorkflowStage::Done);
                telemetry::record_run("done");
                info!("signing workflow complete");
                Ok(url)
            }
            Err(error) => {
                let stage = run.stage;
                run.advance(WorkflowStage::Failed);
                telemetry::record_run(stage.as_str());
                warn!(%stage, error = %error, document_id = ?run.document_id, "signing workflow failed");
                Err(WorkflowFailure {
                    stage,
                    error,
                    document_id: run.document_id.take(),
                })
            }
        }
    }

    async fn execute(&self, run: &mut Run<'_>, request: WorkflowRequest) -> Result<String, WorkflowError> {
        run.advance(WorkflowStage::Generating);
        let sign_request = self.prepare(request, SystemTime::now())?;

        run.advance(WorkflowStage::Signing);
        let document_id = match self.signer.sign(&sign_request).await {
            Ok(document_id) => document_id,
            Err(SignError::DuplicateSubmission {
                key,
                document_id: Some(document_id),
            }) => {
                info!(key = %key, document_id = %document_id, "already signed under this key, resuming");
                document_id
            }
            Err(e) => return Err(e.into()),
        };
        run.document_id = Some(document_id.clone());

        run.advance(WorkflowStage::Settling);
        tokio::time::sleep(self.config.settle_delay).await;

        run.advance(WorkflowStage::Resolving);
        let url = self.resolver.resolve_download_url(&document_id).await?;
        Ok(url)
    }

    fn prepare(&self, request: WorkflowRequest, now: SystemTime) -> Result<SignRequest, WorkflowError> {
        let (document, document_name, signature_coordinates) = match request.document {
            Some(supplied) => {
                if supplied.bytes.is_empty() {
                    return Err(WorkflowError::Generate("supplied document is empty".into()));
                }
                (supplied.bytes, supplied.name, supplied.signature_coordinates)
            }
            None => {
                let policy = PolicyDocument::render(&request.signer_name, chrono::Utc::now());
                info!(policy_number = %policy.policy_number, "rendered policy document");
                (policy.bytes, policy.name, policy_signature_coordinates())
            }
        };

        let idempotency_key = request.idempotency_key.unwrap_or_else(|| {
            self.derive_key(&document, &document_name, &request.signer_name, now)
        });

        Ok(SignRequest {
            document,
            document_name,
            signer_name: request.signer_name,
            signature_coordinates,
            idempotency_key: Some(idempotency_key),
        })
    }

    /// Key for the current window, unless the same submission is already
    /// recorded under the previous window's key.
    fn derive_key(
        &self,
        document: &[u8],
        document_name: &str,
        signer_name: &str,
        now: SystemTime,
    ) -> IdempotencyKey {
        let window = self.config.idempotency_window;
        let current = IdempotencyKey::derive(document, document_name, signer_name, window, now);
        let Some(previous_at) = now.checked_sub(window) else {
            return current;
        };
        let previous = IdempotencyKey::derive(document, document_name, signer_name, window, previous_at);
        if previous != current && self.signer.is_recorded(&previous) {
            return previous;
        }
        current
    }
}

struct Run<'a> {
    stage: WorkflowStage,
    observer: &'a dyn ProgressObserver,
    document_id: Option<String>,
}

impl Run<'_> {
    fn advance(&mut self, to: WorkflowStage) {
        debug_assert!(
            self.stage.can_transition_to(to),
            "illegal transition {} -> {}",
            self.stage,
            to
        );
        let event = ProgressEvent {
            from: self.stage,
            to,
            label: to.label(),
        };
        self.stage = to;
        self.observer.on_transition(&event);
    }
}
