//! Document signer
//!
//! Submits a document for signing and returns the provider's document id.
//! Signing is not idempotent upstream, so a request carrying an
//! [`IdempotencyKey`] is recorded in an in-process ledger and a second
//! submission under the same key is refused without contacting the provider.
//! Once a keyed submission succeeds the ledger remembers the document id, so
//! the refusal carries it and a restarted run can pick the document back up.
//! Entries are forgotten after the signer's retention period.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use provider::SigningProvider;
use sha2::{Digest, Sha256};
use signstation::{SignSubmission, SignatureCoordinate, document_id_from_body};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::auth::AuthClient;
use crate::error::SignError;

/// Deduplication key for a sign submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// SHA-256 hex over the document, its name, the signer, and the start of
    /// the `window` that contains `at`. Identical submissions within one
    /// window produce the same key.
    ///
    /// Windows are fixed buckets aligned to the Unix epoch: two submissions a
    /// second apart on either side of a boundary get different keys. Callers
    /// that need to bridge the boundary also derive the key for `at - window`
    /// and check it with [`DocumentSigner::is_recorded`].
    pub fn derive(
        document: &[u8],
        document_name: &str,
        signer_name: &str,
        window: Duration,
        at: SystemTime,
    ) -> Self {
        let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let window_secs = window.as_secs().max(1);
        let window_start = since_epoch - since_epoch % window_secs;

        let mut hasher = Sha256::new();
        hasher.update(document);
        hasher.update([0u8]);
        hasher.update(document_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(signer_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(window_start.to_be_bytes());

        let hex = hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A single sign call's input.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub document: Vec<u8>,
    pub document_name: String,
    pub signer_name: String,
    pub signature_coordinates: Vec<SignatureCoordinate>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl SignRequest {
    fn to_submission(&self) -> SignSubmission {
        SignSubmission {
            document_base64: STANDARD.encode(&self.document),
            document_name: self.document_name.clone(),
            signer_name: self.signer_name.clone(),
            signature_coordinates: self.signature_coordinates.clone(),
            idempotency_key: self.idempotency_key.as_ref().map(|k| k.as_str().to_string()),
        }
    }
}

/// How long a ledger entry is kept when no retention is configured.
pub const DEFAULT_LEDGER_RETENTION: Duration = Duration::from_secs(10 * 60);

struct LedgerEntry {
    recorded_at: Instant,
    /// Set once the provider accepted the submission
    document_id: Option<String>,
}

pub struct DocumentSigner {
    auth: Arc<AuthClient>,
    provider: Arc<dyn SigningProvider>,
    ledger: Mutex<HashMap<String, LedgerEntry>>,
    retention: Duration,
}

impl DocumentSigner {
    pub fn new(auth: Arc<AuthClient>, provider: Arc<dyn SigningProvider>) -> Self {
        Self {
            auth,
            provider,
            ledger: Mutex::new(HashMap::new()),
            retention: DEFAULT_LEDGER_RETENTION,
        }
    }

    /// Keep idempotency keys for `retention` after they were last recorded.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Submit `request` and return the provider's document id.
    #[instrument(skip_all, fields(document = %request.document_name, bytes = request.document.len()))]
    pub async fn sign(&self, request: &SignRequest) -> Result<String, SignError> {
        let token = self.auth.authenticate().await?;

        if let Some(key) = &request.idempotency_key {
            if let Some(document_id) = self.reserve(key) {
                warn!(key = key.as_str(), document_id = ?document_id, "duplicate sign submission refused");
                return Err(SignError::DuplicateSubmission {
                    key: key.as_str().to_string(),
                    document_id,
                });
            }
        }
        let key = request.idempotency_key.as_ref();

        let submission = request.to_submission();
        let response = match self.provider.submit_document(&token, &submission).await {
            Ok(response) => response,
            Err(e) => {
                // Outcome unknown: the key stays reserved
                warn!(error = %e, "sign call failed");
                return Err(SignError::Transport(e.to_string()));
            }
        };

        if !response.is_success() {
            warn!(status = response.status, "sign rejected");
            if let Some(key) = key {
                self.release(key);
            }
            if response.status == 401 {
                self.auth.cache().invalidate().await;
            }
            return Err(SignError::Rejected {
                status: response.status,
                details: response.body.to_string(),
            });
        }

        let document_id = document_id_from_body(&response.body).ok_or_else(|| {
            warn!("sign reply carried no document id");
            SignError::MissingDocumentId
        })?;

        if let Some(key) = key {
            self.settle(key, &document_id);
        }
        info!(document_id = %document_id, "document submitted for signing");
        Ok(document_id)
    }

    /// Whether `key` is currently held in the ledger, in flight or signed.
    pub fn is_recorded(&self, key: &IdempotencyKey) -> bool {
        let mut ledger = self.lock_ledger();
        self.prune(&mut ledger);
        ledger.contains_key(key.as_str())
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, HashMap<String, LedgerEntry>> {
        self.ledger.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn prune(&self, ledger: &mut HashMap<String, LedgerEntry>) {
        let now = Instant::now();
        let before = ledger.len();
        ledger.retain(|_, entry| now.duration_since(entry.recorded_at) < self.retention);
        let evicted = before - ledger.len();
        if evicted > 0 {
            debug!(evicted, remaining = ledger.len(), "expired idempotency keys evicted");
        }
    }

    /// Reserve `key` for a new submission. Returns `None` when the key was
    /// free, or the existing entry's document id (if known) when it is taken.
    fn reserve(&self, key: &IdempotencyKey) -> Option<Option<String>> {
        let mut ledger = self.lock_ledger();
        self.prune(&mut ledger);
        if let Some(entry) = ledger.get(key.as_str()) {
            return Some(entry.document_id.clone());
        }
        ledger.insert(
            key.as_str().to_string(),
            LedgerEntry {
                recorded_at: Instant::now(),
                document_id: None,
            },
        );
        None
    }

    fn settle(&self, key: &IdempotencyKey, document_id: &str) {
        let mut ledger = self.lock_ledger();
        ledger.insert(
            key.as_str().to_string(),
            LedgerEntry {
                recorded_at: Instant::now(),
                document_id: Some(document_id.to_string()),
            },
        );
    }

    fn release(&self, key: &IdempotencyKey) {
        self.lock_ledger().remove(key.as_str());
    }

    #[cfg(test)]
    fn ledger_len(&self) -> usize {
        self.lock_ledger().len()
    }
}
