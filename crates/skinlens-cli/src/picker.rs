use std::io::{self, BufRead, IsTerminal, Write};

use skinlens_engine::{CredentialPicker, PickerError};

/// Reads an API key from a line-oriented input, normally the terminal.
///
/// A key found in the environment seeds the picker so startup does not
/// prompt; a rejected key prompts again.
pub struct LinePicker<R> {
    input: R,
    key: Option<String>,
}

impl<R: BufRead> LinePicker<R> {
    pub fn new(input: R, seed: Option<String>) -> Self {
        Self {
            input,
            key: seed
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

impl LinePicker<io::StdinLock<'static>> {
    /// `None` when stdin is not a terminal.
    pub fn stdin(seed: Option<String>) -> Option<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        Some(Self::new(stdin.lock(), seed))
    }
}

impl<R: BufRead> CredentialPicker for LinePicker<R> {
    fn has_selected_api_key(&self) -> bool {
        self.key.is_some()
    }

    fn open_select_key(&mut self) -> Result<(), PickerError> {
        let mut stderr = io::stderr();
        let _ = write!(stderr, "Enter Gemini API key (leave empty to cancel): ");
        let _ = stderr.flush();

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|err| PickerError::Failed(format!("failed to read API key: {err}")))?;
        let key = line.trim();
        if read == 0 || key.is_empty() {
            return Err(PickerError::Cancelled);
        }
        self.key = Some(key.to_string());
        Ok(())
    }

    fn api_key(&self) -> Option<String> {
        self.key.clone()
    }
}
