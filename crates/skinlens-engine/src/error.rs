use skinlens_contracts::analysis::ValidationError;
use thiserror::Error;

/// Failure reported by the remote model call itself (transport, HTTP status,
/// blocked prompt). The message is what the credential recovery inspects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("no API key is available; select a key before analyzing")]
    CredentialMissing,
    #[error("an API key is required: set GEMINI_API_KEY (no key picker is available)")]
    CredentialRequiredNoPicker,
    #[error("API key selection failed: {0}")]
    CredentialSelectionFailed(String),
    #[error("API key is invalid or not selected; please select an API key")]
    CredentialInvalidOrUnselected,
    #[error("the API key was rejected and a new key has been selected; run the analysis again")]
    CredentialInvalidReselectionDone,
    #[error("the API key was rejected and selecting a new key failed: {0}")]
    CredentialReselectionFailed(String),
    #[error("no image has been captured yet")]
    NoImageToAnalyze,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl AnalysisError {
    /// Stable identifier used in event logs and by callers picking a UI treatment.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "credential_missing",
            Self::CredentialRequiredNoPicker => "credential_required_no_picker",
            Self::CredentialSelectionFailed(_) => "credential_selection_failed",
            Self::CredentialInvalidOrUnselected => "credential_invalid_or_unselected",
            Self::CredentialInvalidReselectionDone => "credential_invalid_reselection_done",
            Self::CredentialReselectionFailed(_) => "credential_reselection_failed",
            Self::NoImageToAnalyze => "no_image_to_analyze",
            Self::Validation(err) => err.kind(),
            Self::Remote(_) => "remote",
        }
    }

    /// True when the user has to (re)select a credential before retrying.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialMissing
                | Self::CredentialRequiredNoPicker
                | Self::CredentialSelectionFailed(_)
                | Self::CredentialInvalidOrUnselected
                | Self::CredentialReselectionFailed(_)
        )
    }

    /// The key was rejected but a replacement is already selected.
    pub fn is_retryable_after_reselection(&self) -> bool {
        matches!(self, Self::CredentialInvalidReselectionDone)
    }
}

#[cfg(test)]
mod tests {
    use skinlens_contracts::analysis::ValidationError;

    use super::{AnalysisError, RemoteError};

    #[test]
    fn kinds_are_distinct_per_variant() {
        let errors = [
            AnalysisError::CredentialMissing,
            AnalysisError::CredentialRequiredNoPicker,
            AnalysisError::CredentialSelectionFailed("x".to_string()),
            AnalysisError::CredentialInvalidOrUnselected,
            AnalysisError::CredentialInvalidReselectionDone,
            AnalysisError::CredentialReselectionFailed("x".to_string()),
            AnalysisError::NoImageToAnalyze,
            AnalysisError::Validation(ValidationError::EmptyResponse),
            AnalysisError::Remote(RemoteError::new("boom")),
        ];
        let mut kinds = errors.iter().map(AnalysisError::kind).collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn validation_errors_display_transparently() {
        let err = AnalysisError::from(ValidationError::EmptyResponse);
        assert_eq!(err.to_string(), ValidationError::EmptyResponse.to_string());
        assert!(!err.is_credential_error());
    }

    #[test]
    fn reselection_done_is_retryable_not_blocking() {
        let err = AnalysisError::CredentialInvalidReselectionDone;
        assert!(err.is_retryable_after_reselection());
        assert!(!err.is_credential_error());
    }
}
