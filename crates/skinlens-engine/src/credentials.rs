//! API key availability and the rejected-key recovery path.
//!
//! The selection flag lives in a [`CredentialContext`] owned by the caller,
//! so independent sessions never share credential state.

use std::env;

use thiserror::Error;

use crate::error::AnalysisError;

/// Environment variables checked for a pre-provisioned key, in order.
pub const API_KEY_ENV_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

const REJECTED_KEY_SIGNALS: [&str; 3] = [
    "requested entity was not found",
    "entity not found",
    "api key not valid",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PickerError {
    #[error("no API key picker is available")]
    Unavailable,
    #[error("API key selection was cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Host capability for choosing an API key interactively.
pub trait CredentialPicker {
    /// False only for the null picker used when the host has no such capability.
    fn is_available(&self) -> bool {
        true
    }

    fn has_selected_api_key(&self) -> bool;

    fn open_select_key(&mut self) -> Result<(), PickerError>;

    fn api_key(&self) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullPicker;

impl CredentialPicker for NullPicker {
    fn is_available(&self) -> bool {
        false
    }

    fn has_selected_api_key(&self) -> bool {
        false
    }

    fn open_select_key(&mut self) -> Result<(), PickerError> {
        Err(PickerError::Unavailable)
    }

    fn api_key(&self) -> Option<String> {
        None
    }
}

pub struct CredentialContext {
    selected: bool,
    env_key: Option<String>,
    picker: Box<dyn CredentialPicker>,
}

impl CredentialContext {
    pub fn new(picker: Box<dyn CredentialPicker>, env_key: Option<String>) -> Self {
        Self {
            selected: false,
            env_key: env_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            picker,
        }
    }

    pub fn from_env(picker: Box<dyn CredentialPicker>) -> Self {
        Self::new(picker, env_api_key())
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn has_picker(&self) -> bool {
        self.picker.is_available()
    }

    pub fn has_env_key(&self) -> bool {
        self.env_key.is_some()
    }

    /// Initialization check: makes sure some credential is usable, opening
    /// the picker when one exists and nothing is selected yet.
    pub fn ensure_available(&mut self) -> Result<(), AnalysisError> {
        if !self.has_picker() {
            if self.env_key.is_some() {
                self.selected = true;
                return Ok(());
            }
            return Err(AnalysisError::CredentialRequiredNoPicker);
        }
        if self.picker.has_selected_api_key() {
            self.selected = true;
            return Ok(());
        }
        self.select()
            .map_err(|err| AnalysisError::CredentialSelectionFailed(err.to_string()))
    }

    /// Opens the picker and marks the credential selected on success.
    pub fn select(&mut self) -> Result<(), PickerError> {
        self.picker.open_select_key()?;
        self.selected = true;
        tracing::info!("API key selected");
        Ok(())
    }

    /// Precondition of every remote call; never contacts the picker.
    pub fn resolve_api_key(&self) -> Result<String, AnalysisError> {
        if self.picker.has_selected_api_key() {
            if let Some(key) = self.picker.api_key() {
                return Ok(key);
            }
        }
        if let Some(key) = self.env_key.as_ref() {
            return Ok(key.clone());
        }
        if self.selected {
            return Err(AnalysisError::CredentialMissing);
        }
        if self.has_picker() {
            return Err(AnalysisError::CredentialInvalidOrUnselected);
        }
        Err(AnalysisError::CredentialRequiredNoPicker)
    }

    /// Maps a failed remote call to a credential outcome when the key was
    /// rejected; any other error comes back unchanged.
    pub fn recover_credential_error(&mut self, err: AnalysisError) -> AnalysisError {
        let AnalysisError::Remote(remote) = &err else {
            return err;
        };
        if !is_rejected_key_message(&remote.message) {
            return err;
        }

        self.selected = false;
        tracing::warn!(message = %remote.message, "API key rejected by the model endpoint");
        if self.has_picker() {
            return match self.select() {
                Ok(()) => AnalysisError::CredentialInvalidReselectionDone,
                Err(picker_err) => AnalysisError::CredentialReselectionFailed(picker_err.to_string()),
            };
        }
        if self.env_key.is_none() {
            return AnalysisError::CredentialRequiredNoPicker;
        }
        err
    }
}

pub fn is_rejected_key_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    REJECTED_KEY_SIGNALS
        .iter()
        .any(|signal| lowered.contains(signal))
}

pub fn env_api_key() -> Option<String> {
    for key in API_KEY_ENV_VARS {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{CredentialPicker, PickerError};

    /// Scripted picker: each `open_select_key` pops the next outcome.
    #[derive(Default)]
    pub struct ScriptedPicker {
        pub key: Option<String>,
        pub outcomes: VecDeque<Result<String, PickerError>>,
        pub opened: Rc<RefCell<usize>>,
    }

    impl ScriptedPicker {
        pub fn with_outcomes(outcomes: Vec<Result<String, PickerError>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                ..Self::default()
            }
        }
    }

    impl CredentialPicker for ScriptedPicker {
        fn has_selected_api_key(&self) -> bool {
            self.key.is_some()
        }

        fn open_select_key(&mut self) -> Result<(), PickerError> {
            *self.opened.borrow_mut() += 1;
            match self.outcomes.pop_front() {
                Some(Ok(key)) => {
                    self.key = Some(key);
                    Ok(())
                }
                Some(Err(err)) => Err(err),
                None => Err(PickerError::Cancelled),
            }
        }

        fn api_key(&self) -> Option<String> {
            self.key.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use skinlens_contracts::analysis::ValidationError;

    use super::testing::ScriptedPicker;
    use super::{is_rejected_key_message, CredentialContext, NullPicker, PickerError};
    use crate::error::{AnalysisError, RemoteError};

    fn rejected() -> AnalysisError {
        AnalysisError::Remote(RemoteError::with_status(
            404,
            "Gemini request failed (404): Requested entity was not found.",
        ))
    }

    #[test]
    fn null_picker_with_env_key_is_ready() -> Result<(), AnalysisError> {
        let mut ctx = CredentialContext::new(Box::new(NullPicker), Some(" key-1 ".to_string()));
        ctx.ensure_available()?;
        assert!(ctx.is_selected());
        assert_eq!(ctx.resolve_api_key()?, "key-1");
        Ok(())
    }

    #[test]
    fn null_picker_without_env_key_requires_credential() {
        let mut ctx = CredentialContext::new(Box::new(NullPicker), Some("   ".to_string()));
        assert_eq!(
            ctx.ensure_available(),
            Err(AnalysisError::CredentialRequiredNoPicker)
        );
        assert_eq!(
            ctx.resolve_api_key(),
            Err(AnalysisError::CredentialRequiredNoPicker)
        );
    }

    #[test]
    fn picker_is_opened_when_nothing_selected() -> Result<(), AnalysisError> {
        let picker = ScriptedPicker::with_outcomes(vec![Ok("picked".to_string())]);
        let opened = picker.opened.clone();
        let mut ctx = CredentialContext::new(Box::new(picker), None);
        ctx.ensure_available()?;
        assert_eq!(*opened.borrow(), 1);
        assert_eq!(ctx.resolve_api_key()?, "picked");
        Ok(())
    }

    #[test]
    fn picker_failure_during_initialization_is_selection_failed() {
        let picker = ScriptedPicker::with_outcomes(vec![Err(PickerError::Cancelled)]);
        let mut ctx = CredentialContext::new(Box::new(picker), None);
        assert_eq!(
            ctx.ensure_available(),
            Err(AnalysisError::CredentialSelectionFailed(
                "API key selection was cancelled".to_string()
            ))
        );
        assert!(!ctx.is_selected());
        assert_eq!(
            ctx.resolve_api_key(),
            Err(AnalysisError::CredentialInvalidOrUnselected)
        );
    }

    #[test]
    fn selected_flag_without_key_is_credential_missing() -> Result<(), PickerError> {
        let picker = ScriptedPicker::with_outcomes(vec![Ok("temp".to_string())]);
        let mut ctx = CredentialContext::new(Box::new(picker), None);
        ctx.select()?;
        // Simulate the host forgetting the key while the flag stays set.
        ctx.picker = Box::new(ScriptedPicker::default());
        assert_eq!(ctx.resolve_api_key(), Err(AnalysisError::CredentialMissing));
        Ok(())
    }

    #[test]
    fn unrelated_errors_pass_through_recovery_unchanged() {
        let mut ctx = CredentialContext::new(Box::new(NullPicker), None);
        let remote = AnalysisError::Remote(RemoteError::with_status(500, "internal error"));
        assert_eq!(ctx.recover_credential_error(remote.clone()), remote);

        let validation = AnalysisError::Validation(ValidationError::MalformedJson {
            message: "expected value".to_string(),
            raw: "Requested entity was not found".to_string(),
        });
        assert_eq!(ctx.recover_credential_error(validation.clone()), validation);
    }

    #[test]
    fn rejected_key_with_picker_reselects() -> Result<(), AnalysisError> {
        let picker = ScriptedPicker::with_outcomes(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        let mut ctx = CredentialContext::new(Box::new(picker), None);
        ctx.ensure_available()?;
        let recovered = ctx.recover_credential_error(rejected());
        assert_eq!(recovered, AnalysisError::CredentialInvalidReselectionDone);
        assert!(ctx.is_selected());
        assert_eq!(ctx.resolve_api_key()?, "second");
        Ok(())
    }

    #[test]
    fn rejected_key_with_failing_picker_reports_reselection_failure() -> Result<(), AnalysisError> {
        let picker = ScriptedPicker::with_outcomes(vec![
            Ok("first".to_string()),
            Err(PickerError::Failed("dialog crashed".to_string())),
        ]);
        let mut ctx = CredentialContext::new(Box::new(picker), None);
        ctx.ensure_available()?;
        let recovered = ctx.recover_credential_error(rejected());
        assert_eq!(
            recovered,
            AnalysisError::CredentialReselectionFailed("dialog crashed".to_string())
        );
        assert!(!ctx.is_selected());
        Ok(())
    }

    #[test]
    fn rejected_key_without_picker_or_env_requires_credential() {
        let mut ctx = CredentialContext::new(Box::new(NullPicker), None);
        assert_eq!(
            ctx.recover_credential_error(rejected()),
            AnalysisError::CredentialRequiredNoPicker
        );
    }

    #[test]
    fn rejected_env_key_without_picker_surfaces_original_error() {
        let mut ctx = CredentialContext::new(Box::new(NullPicker), Some("env".to_string()));
        assert_eq!(ctx.recover_credential_error(rejected()), rejected());
        assert!(!ctx.is_selected());
    }

    #[test]
    fn rejection_signal_matching_is_case_insensitive() {
        assert!(is_rejected_key_message("REQUESTED ENTITY WAS NOT FOUND"));
        assert!(is_rejected_key_message(
            "Gemini request failed (400): API key not valid. Please pass a valid API key."
        ));
        assert!(!is_rejected_key_message("quota exceeded"));
    }
}
