use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::{
    AnalysisResult, FitzpatrickScale, Recommendations, SeverityIssue, SkinIssues, SkinType,
    SymmetryIssue, SYMMETRY_ISSUE_KEY,
};

const RAW_PREVIEW_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the model returned an empty response")]
    EmptyResponse,
    #[error("the model response is not valid JSON ({message}): {}", truncate_text(.raw, RAW_PREVIEW_MAX_CHARS))]
    MalformedJson { message: String, raw: String },
    #[error("analysis field `{field}` is missing or is not {expected}")]
    InvalidTopLevel {
        field: &'static str,
        expected: &'static str,
    },
    #[error("analysis field `{field}` has unsupported value {value:?}")]
    InvalidEnum { field: &'static str, value: String },
    #[error("issue `{key}` is invalid: {reason}")]
    InvalidIssue { key: &'static str, reason: String },
    #[error("recommendation `{key}` is invalid: {reason}")]
    InvalidRecommendation { key: &'static str, reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyResponse => "empty_response",
            Self::MalformedJson { .. } => "malformed_json",
            Self::InvalidTopLevel { .. } => "invalid_top_level",
            Self::InvalidEnum { .. } => "invalid_enum",
            Self::InvalidIssue { .. } => "invalid_issue",
            Self::InvalidRecommendation { .. } => "invalid_recommendation",
        }
    }
}

/// Trims model text and removes one wrapping markdown fence.
pub fn clean_response_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyResponse);
    }
    let cleaned = strip_code_fence(trimmed).trim();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyResponse);
    }
    Ok(cleaned.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let mut body = text;
    if let Some(rest) = body.strip_prefix("```") {
        body = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body
}

/// Cleans, parses and validates raw model text in one pass.
pub fn parse_analysis_response(text: &str) -> Result<AnalysisResult, ValidationError> {
    let cleaned = clean_response_text(text)?;
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|err| ValidationError::MalformedJson {
            message: err.to_string(),
            raw: cleaned.clone(),
        })?;
    validate_analysis_value(&value)
}

pub fn validate_analysis_value(value: &Value) -> Result<AnalysisResult, ValidationError> {
    let Some(root) = value.as_object() else {
        return Err(ValidationError::InvalidTopLevel {
            field: "(root)",
            expected: "an object",
        });
    };

    let overall_score = required_number(root, "overallScore")?;
    let skin_type_raw = required_str(root, "skinType")?;
    let fitzpatrick_raw = required_str(root, "fitzpatrickScale")?;
    let issues = required_object(root, "issues")?;
    let recommendations = required_object(root, "recommendations")?;
    let explainability = required_str(root, "explainability")?;

    let skin_type = SkinType::parse(skin_type_raw).ok_or_else(|| ValidationError::InvalidEnum {
        field: "skinType",
        value: skin_type_raw.to_string(),
    })?;
    let fitzpatrick_scale =
        FitzpatrickScale::parse(fitzpatrick_raw).ok_or_else(|| ValidationError::InvalidEnum {
            field: "fitzpatrickScale",
            value: fitzpatrick_raw.to_string(),
        })?;

    let issues = SkinIssues {
        acne: severity_issue(issues, "acne")?,
        wrinkles: severity_issue(issues, "wrinkles")?,
        hyperpigmentation: severity_issue(issues, "hyperpigmentation")?,
        pores: severity_issue(issues, "pores")?,
        redness: severity_issue(issues, "redness")?,
        texture: severity_issue(issues, "texture")?,
        hydration: severity_issue(issues, "hydration")?,
        oiliness: severity_issue(issues, "oiliness")?,
        dark_circles: severity_issue(issues, "darkCircles")?,
        symmetry: symmetry_issue(issues)?,
    };

    let recommendations = Recommendations {
        morning_routine: string_list(recommendations, "morningRoutine")?,
        evening_routine: string_list(recommendations, "eveningRoutine")?,
        weekly_treatments: string_list(recommendations, "weeklyTreatments")?,
        lifestyle_tips: string_list(recommendations, "lifestyleTips")?,
    };

    Ok(AnalysisResult {
        overall_score,
        skin_type,
        fitzpatrick_scale,
        issues,
        recommendations,
        explainability: explainability.to_string(),
    })
}

fn required_number(root: &Map<String, Value>, field: &'static str) -> Result<Number, ValidationError> {
    match root.get(field) {
        Some(Value::Number(number)) => Ok(number.clone()),
        _ => Err(ValidationError::InvalidTopLevel {
            field,
            expected: "a number",
        }),
    }
}

fn required_str<'a>(
    root: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, ValidationError> {
    root.get(field)
        .and_then(Value::as_str)
        .ok_or(ValidationError::InvalidTopLevel {
            field,
            expected: "a string",
        })
}

fn required_object<'a>(
    root: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    root.get(field)
        .and_then(Value::as_object)
        .ok_or(ValidationError::InvalidTopLevel {
            field,
            expected: "an object",
        })
}

fn issue_entry<'a>(
    issues: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    match issues.get(key) {
        Some(Value::Object(entry)) => Ok(entry),
        Some(_) => Err(invalid_issue(key, "expected an object")),
        None => Err(invalid_issue(key, "missing")),
    }
}

fn issue_score(entry: &Map<String, Value>, key: &'static str) -> Result<Number, ValidationError> {
    match entry.get("score") {
        Some(Value::Number(number)) => Ok(number.clone()),
        _ => Err(invalid_issue(key, "`score` must be a number")),
    }
}

fn issue_text(
    entry: &Map<String, Value>,
    key: &'static str,
    field: &str,
) -> Result<String, ValidationError> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_issue(key, format!("`{field}` must be a string")))
}

fn severity_issue(
    issues: &Map<String, Value>,
    key: &'static str,
) -> Result<SeverityIssue, ValidationError> {
    let entry = issue_entry(issues, key)?;
    let score = issue_score(entry, key)?;
    let severity = issue_text(entry, key, "severity")?;
    let areas = match entry.get("areas") {
        None | Some(Value::Null) => None,
        Some(Value::Array(rows)) => {
            let mut areas = Vec::with_capacity(rows.len());
            for row in rows {
                let Some(area) = row.as_str() else {
                    return Err(invalid_issue(key, "`areas` must contain only strings"));
                };
                areas.push(area.to_string());
            }
            Some(areas)
        }
        Some(_) => return Err(invalid_issue(key, "`areas` must be an array")),
    };
    Ok(SeverityIssue {
        score,
        severity,
        areas,
    })
}

fn symmetry_issue(issues: &Map<String, Value>) -> Result<SymmetryIssue, ValidationError> {
    let entry = issue_entry(issues, SYMMETRY_ISSUE_KEY)?;
    Ok(SymmetryIssue {
        score: issue_score(entry, SYMMETRY_ISSUE_KEY)?,
        description: issue_text(entry, SYMMETRY_ISSUE_KEY, "description")?,
    })
}

fn string_list(
    recommendations: &Map<String, Value>,
    key: &'static str,
) -> Result<Vec<String>, ValidationError> {
    let rows = match recommendations.get(key) {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(invalid_recommendation(key, "expected an array")),
        None => return Err(invalid_recommendation(key, "missing")),
    };
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let Some(text) = row.as_str() else {
            return Err(invalid_recommendation(
                key,
                format!("item {idx} is not a string"),
            ));
        };
        out.push(text.to_string());
    }
    Ok(out)
}

fn invalid_issue(key: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidIssue {
        key,
        reason: reason.into(),
    }
}

fn invalid_recommendation(key: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidRecommendation {
        key,
        reason: reason.into(),
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{clean_response_text, parse_analysis_response, validate_analysis_value};
    use super::ValidationError;
    use crate::analysis::{ISSUE_KEYS, RECOMMENDATION_KEYS, SEVERITY_ISSUE_KEYS};

    fn sample() -> Value {
        json!({
            "overallScore": 72,
            "skinType": "oily",
            "fitzpatrickScale": "III",
            "issues": {
                "acne": {"score": 35, "severity": "mild", "areas": ["forehead", "chin"]},
                "wrinkles": {"score": 12, "severity": "minimal"},
                "hyperpigmentation": {"score": 28, "severity": "mild", "areas": ["cheeks"]},
                "pores": {"score": 55, "severity": "moderate", "areas": ["nose"]},
                "redness": {"score": 20, "severity": "mild"},
                "texture": {"score": 40, "severity": "moderate"},
                "hydration": {"score": 65, "severity": "good"},
                "oiliness": {"score": 70, "severity": "high", "areas": ["T-zone"]},
                "darkCircles": {"score": 30, "severity": "mild"},
                "symmetry": {"score": 88, "description": "Balanced features with slight jaw asymmetry."}
            },
            "recommendations": {
                "morningRoutine": ["Gentle gel cleanser", "Niacinamide serum", "SPF 50"],
                "eveningRoutine": ["Double cleanse", "BHA toner twice weekly"],
                "weeklyTreatments": ["Clay mask"],
                "lifestyleTips": ["Drink more water", "Change pillowcases often"]
            },
            "explainability": "Shine across the T-zone and visible pores suggest oily skin."
        })
    }

    #[test]
    fn valid_sample_round_trips_unchanged() -> anyhow::Result<()> {
        let input = sample();
        let result = validate_analysis_value(&input)?;
        assert_eq!(serde_json::to_value(&result)?, input);
        Ok(())
    }

    #[test]
    fn fractional_scores_pass_through_verbatim() -> anyhow::Result<()> {
        let mut input = sample();
        input["overallScore"] = json!(71.5);
        input["issues"]["acne"]["score"] = json!(3.25);
        let result = validate_analysis_value(&input)?;
        assert_eq!(result.overall_score_f64(), 71.5);
        assert_eq!(serde_json::to_value(&result)?, input);
        Ok(())
    }

    #[test]
    fn fenced_response_parses_like_bare_json() -> anyhow::Result<()> {
        let bare = serde_json::to_string(&sample())?;
        let fenced = format!("```json\n{bare}\n```");
        let plain_fence = format!("  ```\n{bare}\n```  \n");
        let expected = parse_analysis_response(&bare)?;
        assert_eq!(parse_analysis_response(&fenced)?, expected);
        assert_eq!(parse_analysis_response(&plain_fence)?, expected);
        Ok(())
    }

    #[test]
    fn whitespace_or_bare_fences_are_empty_responses() {
        for text in ["", "   \n\t ", "```", "```json\n```", "``````", "  ```json   ```  "] {
            assert_eq!(
                clean_response_text(text),
                Err(ValidationError::EmptyResponse),
                "input {text:?}"
            );
            assert_eq!(
                parse_analysis_response(text),
                Err(ValidationError::EmptyResponse)
            );
        }
    }

    #[test]
    fn malformed_json_reports_parser_message_and_cleaned_text() {
        let err = parse_analysis_response("```json\n{\"overallScore\": 72,,}\n```").unwrap_err();
        match &err {
            ValidationError::MalformedJson { message, raw } => {
                assert!(!message.is_empty());
                assert_eq!(raw, "{\"overallScore\": 72,,}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("{\"overallScore\": 72,,}"));
        assert_eq!(err.kind(), "malformed_json");
    }

    #[test]
    fn non_object_root_is_invalid_top_level() {
        let err = parse_analysis_response("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTopLevel { .. }));
    }

    #[test]
    fn each_missing_or_mistyped_top_level_field_is_rejected() {
        for field in [
            "overallScore",
            "skinType",
            "fitzpatrickScale",
            "issues",
            "recommendations",
            "explainability",
        ] {
            let mut missing = sample();
            missing.as_object_mut().map(|root| root.remove(field));
            let err = validate_analysis_value(&missing).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidTopLevel { field: got, .. } if got == field),
                "missing {field}: {err:?}"
            );

            let mut mistyped = sample();
            mistyped[field] = json!(true);
            let err = validate_analysis_value(&mistyped).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidTopLevel { field: got, .. } if got == field),
                "mistyped {field}: {err:?}"
            );
        }
    }

    #[test]
    fn numeric_score_as_string_is_rejected() {
        let mut input = sample();
        input["overallScore"] = json!("72");
        let err = validate_analysis_value(&input).unwrap_err();
        assert_eq!(err.kind(), "invalid_top_level");
    }

    #[test]
    fn skin_type_outside_enum_is_rejected() -> anyhow::Result<()> {
        let mut input = sample();
        input["skinType"] = json!("greasy");
        let err = validate_analysis_value(&input).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidEnum {
                field: "skinType",
                value: "greasy".to_string(),
            }
        );

        input["skinType"] = json!("oily");
        validate_analysis_value(&input)?;
        Ok(())
    }

    #[test]
    fn fitzpatrick_outside_enum_is_rejected() {
        let mut input = sample();
        input["fitzpatrickScale"] = json!("VII");
        let err = validate_analysis_value(&input).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidEnum {
                field: "fitzpatrickScale",
                ..
            }
        ));
    }

    #[test]
    fn skin_type_is_checked_before_fitzpatrick() {
        let mut input = sample();
        input["skinType"] = json!("greasy");
        input["fitzpatrickScale"] = json!("VII");
        let err = validate_analysis_value(&input).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidEnum {
                field: "skinType",
                ..
            }
        ));
    }

    #[test]
    fn every_issue_key_missing_a_required_field_is_named() {
        for key in ISSUE_KEYS {
            let mut removed = sample();
            removed["issues"]
                .as_object_mut()
                .map(|issues| issues.remove(key));
            assert_invalid_issue(&removed, key);

            let mut no_score = sample();
            no_score["issues"][key]
                .as_object_mut()
                .map(|entry| entry.remove("score"));
            assert_invalid_issue(&no_score, key);

            let mut text_score = sample();
            text_score["issues"][key]["score"] = json!("high");
            assert_invalid_issue(&text_score, key);
        }

        for key in SEVERITY_ISSUE_KEYS {
            let mut no_severity = sample();
            no_severity["issues"][key]
                .as_object_mut()
                .map(|entry| entry.remove("severity"));
            assert_invalid_issue(&no_severity, key);
        }

        let mut no_description = sample();
        no_description["issues"]["symmetry"]
            .as_object_mut()
            .map(|entry| entry.remove("description"));
        assert_invalid_issue(&no_description, "symmetry");
    }

    #[test]
    fn symmetry_does_not_need_severity() -> anyhow::Result<()> {
        let input = sample();
        assert!(input["issues"]["symmetry"].get("severity").is_none());
        validate_analysis_value(&input)?;
        Ok(())
    }

    #[test]
    fn malformed_areas_are_rejected_but_null_is_absent() -> anyhow::Result<()> {
        let mut input = sample();
        input["issues"]["pores"]["areas"] = json!(["nose", 4]);
        assert_invalid_issue(&input, "pores");

        input["issues"]["pores"]["areas"] = json!("nose");
        assert_invalid_issue(&input, "pores");

        input["issues"]["pores"]["areas"] = Value::Null;
        let result = validate_analysis_value(&input)?;
        assert_eq!(result.issues.pores.areas, None);
        Ok(())
    }

    #[test]
    fn every_recommendation_key_is_required_as_string_list() {
        for key in RECOMMENDATION_KEYS {
            let mut removed = sample();
            removed["recommendations"]
                .as_object_mut()
                .map(|recs| recs.remove(key));
            assert_invalid_recommendation(&removed, key);

            let mut scalar = sample();
            scalar["recommendations"][key] = json!("Use sunscreen");
            assert_invalid_recommendation(&scalar, key);

            let mut mixed = sample();
            mixed["recommendations"][key] = json!(["Use sunscreen", {"step": 2}]);
            assert_invalid_recommendation(&mixed, key);
        }
    }

    #[test]
    fn issues_are_checked_before_recommendations() {
        let mut input = sample();
        input["issues"]["redness"]
            .as_object_mut()
            .map(|entry| entry.remove("severity"));
        input["recommendations"]["lifestyleTips"] = json!(null);
        let err = validate_analysis_value(&input).unwrap_err();
        assert_eq!(err.kind(), "invalid_issue");
    }

    #[test]
    fn empty_recommendation_lists_are_valid() -> anyhow::Result<()> {
        let mut input = sample();
        input["recommendations"]["weeklyTreatments"] = json!([]);
        let result = validate_analysis_value(&input)?;
        assert!(result.recommendations.weekly_treatments.is_empty());
        Ok(())
    }

    fn assert_invalid_issue(input: &Value, expected_key: &str) {
        match validate_analysis_value(input) {
            Err(ValidationError::InvalidIssue { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected InvalidIssue for {expected_key}, got {other:?}"),
        }
    }

    fn assert_invalid_recommendation(input: &Value, expected_key: &str) {
        match validate_analysis_value(input) {
            Err(ValidationError::InvalidRecommendation { key, .. }) => {
                assert_eq!(key, expected_key)
            }
            other => panic!("expected InvalidRecommendation for {expected_key}, got {other:?}"),
        }
    }
}
