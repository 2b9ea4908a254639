use skinlens_contracts::analysis::{analysis_prompt, parse_analysis_response, AnalysisResult};

use crate::capture::CapturedImage;
use crate::credentials::CredentialContext;
use crate::error::AnalysisError;
use crate::gemini::{ContentGenerator, GenerateContentRequest};

/// Photo in, validated analysis out.
pub struct AnalysisPipeline {
    generator: Box<dyn ContentGenerator>,
    model: String,
    prompt: String,
}

impl AnalysisPipeline {
    pub fn new(generator: Box<dyn ContentGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
            prompt: analysis_prompt(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Runs one analysis. Credential preconditions fail before any remote
    /// call; every later failure goes through credential recovery first.
    pub fn analyze(
        &self,
        credentials: &mut CredentialContext,
        image: &CapturedImage,
    ) -> Result<AnalysisResult, AnalysisError> {
        let api_key = credentials.resolve_api_key()?;
        let request = GenerateContentRequest {
            model: &self.model,
            prompt: &self.prompt,
            mime_type: &image.mime_type,
            data_base64: &image.data_base64,
        };
        tracing::info!(
            provider = self.generator.name(),
            model = %self.model,
            mime_type = %image.mime_type,
            bytes = image.byte_len,
            "requesting skin analysis"
        );

        let outcome = self
            .generator
            .generate_content(&request, &api_key)
            .map_err(AnalysisError::from)
            .and_then(|text| parse_analysis_response(&text).map_err(AnalysisError::from));

        match outcome {
            Ok(result) => {
                tracing::info!(
                    overall_score = %result.overall_score,
                    skin_type = result.skin_type.as_str(),
                    "skin analysis validated"
                );
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "skin analysis failed");
                Err(credentials.recover_credential_error(err))
            }
        }
    }
}
