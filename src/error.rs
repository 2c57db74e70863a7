//! Error types for the SPIRE Identity Operator

use thiserror::Error;

/// Errors returned by the control-plane seam
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Create raced with another writer
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    /// resourceVersion mismatch on update
    #[error("conflict writing {kind} {name}: the object has been modified")]
    Conflict { kind: String, name: String },

    /// Update or status write of an object that no longer exists
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),

    /// Any other failure talking to the control plane
    #[error("control plane error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object handed to the seam without a name
    #[error("{0} is missing metadata.name")]
    MissingName(String),
}

impl ClusterError {
    /// Conflicts resolve by re-reading; everything else is fatal to the pass
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict { .. })
    }
}

/// Errors from the convergence primitive, tagged with the operation that failed
#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("failed to read {kind} {name}: {source}")]
    Get {
        kind: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to update {kind} {name}: {source}")]
    Update {
        kind: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("desired {0} has no metadata.name")]
    MissingName(String),
}

impl ConvergeError {
    /// Machine-readable reason written to the failing step's condition
    pub fn reason(&self) -> &'static str {
        match self {
            ConvergeError::Get { .. } => "GetFailed",
            ConvergeError::Create { .. } => "CreateFailed",
            ConvergeError::Update { source, .. } if source.is_conflict() => "UpdateConflict",
            ConvergeError::Update { .. } => "UpdateFailed",
            ConvergeError::MissingName(_) => "InvalidManifest",
        }
    }
}

/// Errors that abort a reconciler pass
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Reading the primary record failed
    #[error("failed to read {kind} {name}: {source}")]
    Fetch {
        kind: &'static str,
        name: String,
        #[source]
        source: ClusterError,
    },

    /// The record's own spec is unusable
    #[error("invalid {kind} spec: {message}")]
    InvalidSpec { kind: &'static str, message: String },

    /// Linking the record to the scaffolding singleton failed
    #[error("failed to establish owner reference: {0}")]
    OwnerLink(#[source] ClusterError),

    /// Recreating the scaffolding singleton failed
    #[error("failed to recreate singleton {kind}: {source}")]
    Recreate {
        kind: &'static str,
        #[source]
        source: ClusterError,
    },

    /// Reading related operand records failed
    #[error("failed to look up operand records: {0}")]
    Lookup(#[source] ClusterError),

    /// A convergence step failed
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: ConvergeError,
    },

    /// Rendering a desired manifest failed
    #[error("failed to render {what}: {message}")]
    Manifest { what: &'static str, message: String },

    /// Writing the status sub-resource failed
    #[error("failed to update status: {0}")]
    Status(#[source] ClusterError),
}

impl ReconcileError {
    /// Invalid specs only change when a human edits the record; everything else can be retried
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::InvalidSpec { .. })
    }

    /// Reason written to the record's `Ready` condition when a pass fails
    pub fn ready_reason(&self) -> &'static str {
        match self {
            ReconcileError::Fetch { .. } => "FetchFailed",
            ReconcileError::InvalidSpec { .. } => "InvalidConfiguration",
            ReconcileError::OwnerLink(_) => "OwnerLinkFailed",
            ReconcileError::Recreate { .. } => "RecreateFailed",
            ReconcileError::Lookup(_) => "LookupFailed",
            ReconcileError::Step { .. } => "StepFailed",
            ReconcileError::Manifest { .. } => "ManifestFailed",
            ReconcileError::Status(_) => "StatusUpdateFailed",
        }
    }
}

/// Result type for reconciler passes
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
