use thiserror::Error;

/// Boxed provider error carried through discovery and convergence failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a single task can end with.
///
/// Discovery failures, ambiguous matches and convergence failures are
/// separate variants: only a clean "not found" may lead to a create call.
#[derive(Debug, Error)]
pub enum TaskError {
  /// The task has no name and therefore no identity.
  #[error("{kind} task has no name")]
  Unnamed { kind: &'static str },

  /// A reference field was read before the resolver bound it.
  #[error("reference '{field}' to '{target}' has not been resolved")]
  Unresolved { field: &'static str, target: String },

  /// A provider-assigned output of another task is needed but not known yet.
  #[error("{task} has no {output} yet")]
  OutputUnknown { task: String, output: &'static str },

  /// Current state could not be determined (transient or permission failure).
  #[error("discovery failed: {source}")]
  Discovery {
    #[source]
    source: BoxError,
  },

  /// More than one provider object matches an identity that must be unique.
  #[error("{count} provider objects match, expected at most one")]
  Ambiguous { count: usize },

  /// The desired change cannot be applied to the observed object.
  #[error("cannot change '{field}': {reason}")]
  InvalidChange { field: String, reason: String },

  /// The provider rejected a create, update or delete call.
  #[error("provider call failed: {source}")]
  Provider {
    #[source]
    source: BoxError,
  },

  /// The observation handed to render was not produced by this kind.
  #[error("observed state is not a {expected} state")]
  StateMismatch { expected: &'static str },

  /// State could not be serialized for diffing.
  #[error("failed to serialize state: {0}")]
  Serialize(#[from] serde_json::Error),

  /// The worker running the task panicked.
  #[error("task panicked: {message}")]
  Panicked { message: String },
}

impl TaskError {
  /// Wrap an error returned by a provider mutation.
  pub fn provider(err: impl Into<BoxError>) -> Self {
    TaskError::Provider { source: err.into() }
  }

  /// Wrap an error returned by a provider lookup.
  pub fn discovery(err: impl Into<BoxError>) -> Self {
    TaskError::Discovery { source: err.into() }
  }

  pub fn invalid_change(field: impl Into<String>, reason: impl Into<String>) -> Self {
    TaskError::InvalidChange {
      field: field.into(),
      reason: reason.into(),
    }
  }
}
