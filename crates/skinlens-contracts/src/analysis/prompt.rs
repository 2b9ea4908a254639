use super::{
    FITZPATRICK_TYPES, RECOMMENDATION_KEYS, SEVERITY_ISSUE_KEYS, SKIN_TYPES, SYMMETRY_ISSUE_KEY,
};

/// Instruction sent alongside the face photo. The JSON layout described here
/// is the one `validate_analysis_value` enforces.
pub fn analysis_prompt() -> String {
    let skin_types = quoted_list(&SKIN_TYPES);
    let fitzpatrick = quoted_list(&FITZPATRICK_TYPES);

    let mut issue_lines = Vec::new();
    for key in SEVERITY_ISSUE_KEYS {
        issue_lines.push(format!(
            "    \"{key}\": {{ \"score\": <0-100>, \"severity\": \"<none|mild|moderate|severe>\", \"areas\": [\"<face region>\"] }}"
        ));
    }
    issue_lines.push(format!(
        "    \"{SYMMETRY_ISSUE_KEY}\": {{ \"score\": <0-100>, \"description\": \"<one sentence>\" }}"
    ));

    let recommendation_lines = RECOMMENDATION_KEYS
        .iter()
        .map(|key| format!("    \"{key}\": [\"<short actionable step>\"]"))
        .collect::<Vec<String>>();

    format!(
        "You are a board-certified dermatologist reviewing a front-facing facial photo.\n\
Assess the visible skin only. Do not identify the person.\n\
\n\
Evaluate:\n\
- overall skin health as a single score from 0 (poor) to 100 (excellent)\n\
- skin type, one of: {skin_types}\n\
- Fitzpatrick phototype, one of: {fitzpatrick}\n\
- acne, wrinkles, hyperpigmentation, pore visibility, redness, texture, hydration, oiliness and dark circles, \
each scored 0-100 where higher means more pronounced, with a severity word and the affected face regions\n\
- facial symmetry, scored 0-100 where higher means more symmetric, with a short description\n\
- a personalised routine: morning steps, evening steps, weekly treatments and lifestyle tips\n\
- a short plain-language explanation of the visual evidence behind the assessment\n\
\n\
If the image does not show a face clearly, use \"unknown\" for skinType and fitzpatrickScale and explain why.\n\
\n\
Respond with JSON only (no markdown, no prose outside JSON, no trailing commas) using exactly this shape:\n\
{{\n\
  \"overallScore\": <0-100>,\n\
  \"skinType\": \"<skin type>\",\n\
  \"fitzpatrickScale\": \"<phototype>\",\n\
  \"issues\": {{\n\
{issues}\n\
  }},\n\
  \"recommendations\": {{\n\
{recommendations}\n\
  }},\n\
  \"explainability\": \"<2-4 sentences>\"\n\
}}",
        issues = issue_lines.join(",\n"),
        recommendations = recommendation_lines.join(",\n"),
    )
}

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|value| format!("\"{value}\""))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::analysis_prompt;
    use crate::analysis::{FITZPATRICK_TYPES, ISSUE_KEYS, RECOMMENDATION_KEYS, SKIN_TYPES};

    #[test]
    fn prompt_names_every_schema_key_and_enum_value() {
        let prompt = analysis_prompt();
        for key in ISSUE_KEYS.iter().chain(RECOMMENDATION_KEYS.iter()) {
            assert!(prompt.contains(&format!("\"{key}\"")), "missing {key}");
        }
        for value in SKIN_TYPES.iter().chain(FITZPATRICK_TYPES.iter()) {
            assert!(prompt.contains(&format!("\"{value}\"")), "missing {value}");
        }
        for key in ["overallScore", "skinType", "fitzpatrickScale", "explainability"] {
            assert!(prompt.contains(key));
        }
        assert!(prompt.contains("JSON only"));
    }
}
