//! Error kinds for setup-agent operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on the kind to decide how to react: retry an inference,
/// report a blocked command back to the agent, or abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// Catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Provider not reachable or not configured
    ProviderUnavailable,

    /// Rate limit exceeded
    RateLimited,

    /// The model answered, but not in the requested shape
    ResponseInvalid,

    // =========================================================================
    // Shell errors
    // =========================================================================
    /// The shell process could not be spawned or written to
    ShellFailed,

    /// The shell did not reach its prompt in time
    ShellTimeout,

    /// A command was refused by the security guard or the user
    CommandBlocked,

    // =========================================================================
    // Tool errors
    // =========================================================================
    /// Web search request failed
    SearchFailed,

    /// Interactive prompt could not be shown or was cancelled
    PromptFailed,

    // =========================================================================
    // Distribution errors
    // =========================================================================
    /// No distributable artifact could be found
    ArtifactNotFound,

    /// The build command failed
    BuildFailed,

    /// Installing the artifact failed
    InstallFailed,

    /// Nothing to uninstall
    NotInstalled,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    /// Failed to parse input
    ParseFailed,

    // =========================================================================
    // Workflow errors
    // =========================================================================
    /// The workflow was interrupted
    WorkflowAborted,

    /// The workflow visited more nodes than allowed
    RecursionLimit,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ResponseInvalid => "ResponseInvalid",

            ErrorKind::ShellFailed => "ShellFailed",
            ErrorKind::ShellTimeout => "ShellTimeout",
            ErrorKind::CommandBlocked => "CommandBlocked",

            ErrorKind::SearchFailed => "SearchFailed",
            ErrorKind::PromptFailed => "PromptFailed",

            ErrorKind::ArtifactNotFound => "ArtifactNotFound",
            ErrorKind::BuildFailed => "BuildFailed",
            ErrorKind::InstallFailed => "InstallFailed",
            ErrorKind::NotInstalled => "NotInstalled",

            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::ParseFailed => "ParseFailed",

            ErrorKind::WorkflowAborted => "WorkflowAborted",
            ErrorKind::RecursionLimit => "RecursionLimit",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ShellTimeout
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ArtifactNotFound.to_string(), "ArtifactNotFound");
        assert_eq!(ErrorKind::InferenceFailed.to_string(), "InferenceFailed");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::ResponseInvalid.is_retryable());
        assert!(!ErrorKind::CommandBlocked.is_retryable());
    }
}
