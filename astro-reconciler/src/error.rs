//! Reconcile error types
//!
//! Every failure names the attempted verb, the deployment identity when one
//! is known, and the underlying remote error text. Convergence failures also
//! carry the best-known declared state so the caller can track a deployment
//! that was created but never became healthy.

use astro_client::ClientError;
use shared::DeclaredDeployment;
use std::fmt;
use thiserror::Error;

use crate::poller::PollFailure;

/// Lifecycle verb being reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    CreateRejected,
    UpdateRejected,
    DeleteRejected,
    /// The control plane does not know the identity
    NotFound,
    /// Transport or protocol failure, not a refused operation
    RemoteError,
    /// Convergence wait exceeded its bound or was cancelled
    Timeout,
    /// The control plane reported a failed status while converging
    RemoteTerminalFailure,
    /// Rejected locally before any remote call
    InvalidDeclaration,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateRejected => "create rejected",
            Self::UpdateRejected => "update rejected",
            Self::DeleteRejected => "delete rejected",
            Self::NotFound => "not found",
            Self::RemoteError => "remote error",
            Self::Timeout => "timed out",
            Self::RemoteTerminalFailure => "remote terminal failure",
            Self::InvalidDeclaration => "invalid declaration",
        }
    }

    /// Rejection kind for a verb
    fn rejected(verb: Verb) -> Self {
        match verb {
            Verb::Create => Self::CreateRejected,
            Verb::Update => Self::UpdateRejected,
            Verb::Delete => Self::DeleteRejected,
            Verb::Read | Verb::Import => Self::RemoteError,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reconcile failure
#[derive(Debug, Error)]
#[error(
    "{verb} deployment {}: {kind}: {message}",
    .identity.as_deref().unwrap_or("<unassigned>")
)]
pub struct ReconcileError {
    pub kind: FailureKind,
    pub verb: Verb,
    pub identity: Option<String>,
    pub message: String,
    /// Best-known declared state when the remote side was partly changed
    pub partial: Option<Box<DeclaredDeployment>>,
    #[source]
    pub source: Option<ClientError>,
}

impl ReconcileError {
    pub fn new(kind: FailureKind, verb: Verb, message: impl Into<String>) -> Self {
        Self {
            kind,
            verb,
            identity: None,
            message: message.into(),
            partial: None,
            source: None,
        }
    }

    pub fn invalid(verb: Verb, message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidDeclaration, verb, message)
    }

    pub fn with_identity(mut self, identity: Option<&str>) -> Self {
        self.identity = identity.filter(|id| !id.is_empty()).map(str::to_string);
        self
    }

    pub fn with_partial(mut self, partial: DeclaredDeployment) -> Self {
        if self.identity.is_none() {
            self = self.with_identity(partial.identity());
        }
        self.partial = Some(Box::new(partial));
        self
    }

    /// Map a failed remote call for `verb`
    pub fn from_client(verb: Verb, identity: Option<&str>, err: ClientError) -> Self {
        let kind = if err.is_transport() {
            FailureKind::RemoteError
        } else if verb == Verb::Read && err.is_not_found() {
            FailureKind::NotFound
        } else {
            FailureKind::rejected(verb)
        };
        Self {
            message: err.to_string(),
            source: Some(err),
            ..Self::new(kind, verb, String::new())
        }
        .with_identity(identity)
    }

    /// Map a failed convergence wait for `verb`
    pub fn from_poll(verb: Verb, identity: &str, failure: PollFailure) -> Self {
        let kind = match &failure {
            PollFailure::Timeout { .. } | PollFailure::Cancelled { .. } => FailureKind::Timeout,
            PollFailure::TerminalFailure { .. } => FailureKind::RemoteTerminalFailure,
            PollFailure::Remote { .. } => FailureKind::RemoteError,
        };
        let message = failure.to_string();
        let source = failure.into_client_error();
        Self {
            source,
            ..Self::new(kind, verb, message)
        }
        .with_identity(Some(identity))
    }

    pub fn partial(&self) -> Option<&DeclaredDeployment> {
        self.partial.as_deref()
    }

    pub fn into_partial(self) -> Option<DeclaredDeployment> {
        self.partial.map(|p| *p)
    }
}

/// Result type for reconcile operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
