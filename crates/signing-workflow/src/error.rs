//! Error types for the signing workflow
//!
//! Each component fails with its own enum; `WorkflowError` is what the
//! orchestrator surfaces, with auth failures lifted out of the signer and
//! resolver so callers see where the chain actually broke.

/// Failures obtaining a bearer token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth rejected with status {status}: {details}")]
    Rejected { status: u16, details: String },

    #[error("auth succeeded but no access token was returned")]
    MissingToken,

    #[error("auth call failed: {0}")]
    Transport(String),
}

/// Failures submitting a document for signing.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("authentication failed before signing: {0}")]
    Auth(#[from] AuthError),

    #[error("signing rejected with status {status}: {details}")]
    Rejected { status: u16, details: String },

    #[error("signing reply carried neither id nor documentId")]
    MissingDocumentId,

    /// The key is already in the ledger. `document_id` is known when the
    /// earlier submission was accepted.
    #[error("document already submitted under idempotency key {key}")]
    DuplicateSubmission {
        key: String,
        document_id: Option<String>,
    },

    #[error("sign call failed, outcome unknown: {0}")]
    Transport(String),
}

/// Failures resolving a download URL.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("authentication failed before resolving: {0}")]
    Auth(#[from] AuthError),

    #[error("download lookup rejected with status {status}: {details}")]
    Rejected { status: u16, details: String },

    #[error("download reply has no usable URL: {0}")]
    InvalidPayload(String),

    #[error("download URL still unavailable after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("download call failed: {0}")]
    Transport(String),
}

/// Failure carried by a workflow that reached `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("document generation failed: {0}")]
    Generate(String),

    #[error(transparent)]
    Auth(AuthError),

    #[error(transparent)]
    Sign(SignError),

    #[error(transparent)]
    Resolve(ResolveError),
}

impl From<SignError> for WorkflowError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::Auth(auth) => WorkflowError::Auth(auth),
            other => WorkflowError::Sign(other),
        }
    }
}

impl From<ResolveError> for WorkflowError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Auth(auth) => WorkflowError::Auth(auth),
            other => WorkflowError::Resolve(other),
        }
    }
}

/// Failures registering consent.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("consent token request failed: {0}")]
    TokenFetch(String),

    #[error("consent token endpoint returned no access_token")]
    MissingToken,

    #[error("consent registration rejected with status {status}: {details}")]
    Registration { status: u16, details: String },

    #[error("consent registration returned no consentCollectUrl")]
    MissingUrl,

    #[error("consent call failed: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_auth_failure_lifts_to_workflow_auth() {
        let err: WorkflowError = SignError::Auth(AuthError::MissingToken).into();
        assert!(matches!(err, WorkflowError::Auth(AuthError::MissingToken)));
    }

    #[test]
    fn resolve_errors_stay_resolve() {
        let err: WorkflowError = ResolveError::NotReady { attempts: 4 }.into();
        assert!(matches!(err, WorkflowError::Resolve(ResolveError::NotReady { attempts: 4 })));
        assert_eq!(err.to_string(), "download URL still unavailable after 4 attempts");
    }

    #[test]
    fn rejected_display_includes_status() {
        let err = AuthError::Rejected {
            status: 401,
            details: r#"{"message":"invalid client"}"#.into(),
        };
        assert!(err.to_string().contains("401"), "got: {err}");
    }
}
