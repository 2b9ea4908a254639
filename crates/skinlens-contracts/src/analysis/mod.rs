//! Validated shape of a facial skin analysis returned by the model.
//!
//! Values of these types are only ever built by [`validate_analysis_value`],
//! so a partially populated result cannot exist.

mod prompt;
mod validate;

use serde::Serialize;
use serde_json::Number;

pub use prompt::analysis_prompt;
pub use validate::{
    clean_response_text, parse_analysis_response, validate_analysis_value, ValidationError,
};

pub const SKIN_TYPES: [&str; 5] = ["oily", "dry", "combination", "normal", "unknown"];

pub const FITZPATRICK_TYPES: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "unknown"];

/// Issue keys carrying `severity` (and optionally `areas`), in schema order.
pub const SEVERITY_ISSUE_KEYS: [&str; 9] = [
    "acne",
    "wrinkles",
    "hyperpigmentation",
    "pores",
    "redness",
    "texture",
    "hydration",
    "oiliness",
    "darkCircles",
];

pub const SYMMETRY_ISSUE_KEY: &str = "symmetry";

pub const ISSUE_KEYS: [&str; 10] = [
    "acne",
    "wrinkles",
    "hyperpigmentation",
    "pores",
    "redness",
    "texture",
    "hydration",
    "oiliness",
    "darkCircles",
    "symmetry",
];

pub const RECOMMENDATION_KEYS: [&str; 4] = [
    "morningRoutine",
    "eveningRoutine",
    "weeklyTreatments",
    "lifestyleTips",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkinType {
    Oily,
    Dry,
    Combination,
    Normal,
    Unknown,
}

impl SkinType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "oily" => Some(Self::Oily),
            "dry" => Some(Self::Dry),
            "combination" => Some(Self::Combination),
            "normal" => Some(Self::Normal),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oily => "oily",
            Self::Dry => "dry",
            Self::Combination => "combination",
            Self::Normal => "normal",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitzpatrickScale {
    #[serde(rename = "I")]
    TypeI,
    #[serde(rename = "II")]
    TypeII,
    #[serde(rename = "III")]
    TypeIII,
    #[serde(rename = "IV")]
    TypeIV,
    #[serde(rename = "V")]
    TypeV,
    #[serde(rename = "VI")]
    TypeVI,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FitzpatrickScale {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "I" => Some(Self::TypeI),
            "II" => Some(Self::TypeII),
            "III" => Some(Self::TypeIII),
            "IV" => Some(Self::TypeIV),
            "V" => Some(Self::TypeV),
            "VI" => Some(Self::TypeVI),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeI => "I",
            Self::TypeII => "II",
            Self::TypeIII => "III",
            Self::TypeIV => "IV",
            Self::TypeV => "V",
            Self::TypeVI => "VI",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityIssue {
    pub score: Number,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub areas: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymmetryIssue {
    pub score: Number,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinIssues {
    pub acne: SeverityIssue,
    pub wrinkles: SeverityIssue,
    pub hyperpigmentation: SeverityIssue,
    pub pores: SeverityIssue,
    pub redness: SeverityIssue,
    pub texture: SeverityIssue,
    pub hydration: SeverityIssue,
    pub oiliness: SeverityIssue,
    pub dark_circles: SeverityIssue,
    pub symmetry: SymmetryIssue,
}

impl SkinIssues {
    /// The nine severity-bearing issues paired with their schema key.
    pub fn severity_issues(&self) -> [(&'static str, &SeverityIssue); 9] {
        [
            ("acne", &self.acne),
            ("wrinkles", &self.wrinkles),
            ("hyperpigmentation", &self.hyperpigmentation),
            ("pores", &self.pores),
            ("redness", &self.redness),
            ("texture", &self.texture),
            ("hydration", &self.hydration),
            ("oiliness", &self.oiliness),
            ("darkCircles", &self.dark_circles),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub morning_routine: Vec<String>,
    pub evening_routine: Vec<String>,
    pub weekly_treatments: Vec<String>,
    pub lifestyle_tips: Vec<String>,
}

impl Recommendations {
    pub fn sections(&self) -> [(&'static str, &[String]); 4] {
        [
            ("morningRoutine", self.morning_routine.as_slice()),
            ("eveningRoutine", self.evening_routine.as_slice()),
            ("weeklyTreatments", self.weekly_treatments.as_slice()),
            ("lifestyleTips", self.lifestyle_tips.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overall_score: Number,
    pub skin_type: SkinType,
    pub fitzpatrick_scale: FitzpatrickScale,
    pub issues: SkinIssues,
    pub recommendations: Recommendations,
    pub explainability: String,
}

impl AnalysisResult {
    pub fn overall_score_f64(&self) -> f64 {
        self.overall_score.as_f64().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{FitzpatrickScale, SkinType, FITZPATRICK_TYPES, SKIN_TYPES};

    #[test]
    fn enum_parsers_accept_exactly_the_schema_values() {
        for raw in SKIN_TYPES {
            let parsed = SkinType::parse(raw).map(|value| value.as_str());
            assert_eq!(parsed, Some(raw));
        }
        for raw in FITZPATRICK_TYPES {
            let parsed = FitzpatrickScale::parse(raw).map(|value| value.as_str());
            assert_eq!(parsed, Some(raw));
        }
        assert_eq!(SkinType::parse("Oily"), None);
        assert_eq!(FitzpatrickScale::parse("iii"), None);
        assert_eq!(FitzpatrickScale::parse("VII"), None);
    }

    #[test]
    fn fitzpatrick_serializes_as_roman_numeral() -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&FitzpatrickScale::TypeIV)?;
        assert_eq!(encoded, "\"IV\"");
        Ok(())
    }
}
