use std::fmt::Write as _;

use skinlens_contracts::analysis::AnalysisResult;

pub fn score_band(score: f64) -> &'static str {
    if score >= 80.0 {
        "excellent"
    } else if score >= 60.0 {
        "good"
    } else if score >= 40.0 {
        "fair"
    } else {
        "needs attention"
    }
}

/// `darkCircles` -> `dark circles`.
pub fn humanize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push(' ');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Plain-text report for terminal output.
pub fn render_report(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let band = score_band(result.overall_score_f64());
    let _ = writeln!(out, "Overall score: {} ({band})", result.overall_score);
    let _ = writeln!(out, "Skin type: {}", result.skin_type.as_str());
    let _ = writeln!(
        out,
        "Fitzpatrick scale: {}",
        result.fitzpatrick_scale.as_str()
    );

    let _ = writeln!(out, "\nIssues:");
    for (key, issue) in result.issues.severity_issues() {
        let mut line = format!(
            "  {:<18} {:>5}  {}",
            humanize_key(key),
            issue.score.to_string(),
            issue.severity
        );
        if let Some(areas) = issue.areas.as_ref().filter(|areas| !areas.is_empty()) {
            let _ = write!(line, " ({})", areas.join(", "));
        }
        let _ = writeln!(out, "{line}");
    }
    let symmetry = &result.issues.symmetry;
    let _ = writeln!(
        out,
        "  {:<18} {:>5}  {}",
        "symmetry",
        symmetry.score.to_string(),
        symmetry.description
    );

    for (key, items) in result.recommendations.sections() {
        if items.is_empty() {
            continue;
        }
        let heading = humanize_key(key);
        let mut chars = heading.chars();
        let heading = match chars.next() {
            Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
            None => heading,
        };
        let _ = writeln!(out, "\n{heading}:");
        for item in items {
            let _ = writeln!(out, "  - {item}");
        }
    }

    if !result.explainability.trim().is_empty() {
        let _ = writeln!(out, "\nWhy: {}", result.explainability.trim());
    }
    out
}
