use thiserror::Error;

/// Tag used by engines for "no route matches this URL".
pub const UNRECOGNIZED_URL_TAG: &str = "UnrecognizedURLError";
/// Tag used by engines for "navigation was superseded before it finished".
pub const TRANSITION_ABORTED_TAG: &str = "TransitionAborted";

/// A render that failed for a reason the engine did not anticipate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFailure {
    pub name: Option<String>,
    pub message: String,
    pub stack: Option<String>,
}

impl RenderFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// The stack trace when the engine captured one, otherwise the message.
    pub fn diagnostic(&self) -> &str {
        self.stack.as_deref().unwrap_or(&self.message)
    }
}

impl std::fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name.as_deref() {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Every way a `visit` can fail. The variant alone decides how the
/// middleware reacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no route recognizes `{path}`")]
    UnrecognizedUrl { path: String },
    #[error("transition to `{path}` was aborted")]
    TransitionAborted { path: String },
    #[error("render failed: {0}")]
    Failed(RenderFailure),
}

impl RenderError {
    pub fn unrecognized(path: impl Into<String>) -> Self {
        Self::UnrecognizedUrl { path: path.into() }
    }

    pub fn aborted(path: impl Into<String>) -> Self {
        Self::TransitionAborted { path: path.into() }
    }

    pub fn failed(failure: RenderFailure) -> Self {
        Self::Failed(failure)
    }

    /// Build an error from an engine that reports failures as a name string.
    ///
    /// Only the two known tags map to their variants; anything else,
    /// including a missing name, is an unexpected failure.
    pub fn from_tag(
        name: Option<&str>,
        path: impl Into<String>,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        match name {
            Some(UNRECOGNIZED_URL_TAG) => Self::unrecognized(path),
            Some(TRANSITION_ABORTED_TAG) => Self::aborted(path),
            other => Self::Failed(RenderFailure {
                name: other.map(str::to_string),
                message: message.into(),
                stack,
            }),
        }
    }

    /// The classification tag of this error, if it has one.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::UnrecognizedUrl { .. } => Some(UNRECOGNIZED_URL_TAG),
            Self::TransitionAborted { .. } => Some(TRANSITION_ABORTED_TAG),
            Self::Failed(failure) => failure.name.as_deref(),
        }
    }
}
