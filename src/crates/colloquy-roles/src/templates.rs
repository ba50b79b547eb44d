//! Prompt templates for the classroom roles
//!
//! Templates use `{name}` placeholders filled by [`render`]. The first line
//! of every template names the role, which lets a [`ScriptedModel`] tell
//! the roles apart.
//!
//! [`ScriptedModel`]: crate::ScriptedModel

use crate::model::Document;

pub const REPORT: &str = r#"Role: reporter
You are the reporting student in an international politics seminar.
Write a concise report answering the question below from the material.

Question: {query}

Material:
"""
{context}
"""

Notes:
- Keep it under 500 words and explain technical terms plainly.
- Organize the report as three bullet points, each starting with "- ".
- Cite the source at the end of each point.
"#;

pub const CRITIQUE: &str = r#"Role: critic
You are a seminar student who extracts discussion points from a critical
perspective. Extract three points from the report below and give each point
two opposing cases.

Report:
{report}

Your previous points (revise them if present):
{previous}

Teaching assistant feedback:
{feedback}

Answer with JSON only, shaped as
{"points": [{"title": "...", "cases": ["...", "..."]}]}
- The first two titles are yes/no questions; their cases start with "Yes:" and "No:".
- The third title is an open question whose cases are two contrasting views.
- Points must not overlap: cover effectiveness, legitimacy and long-term effects.
"#;

pub const TA_REVIEW: &str = r#"Role: teaching assistant
Review the discussion points a critic extracted from the report.
Answer APPROVE on the first line if they are ready for the class to discuss.
Otherwise answer REVISE on the first line, followed by concrete feedback.

Report:
{report}

Points:
{points}
"#;

pub const CHECK_CASES: &str = r#"Role: checker
You are the reporting student in an international politics seminar.
From the material below, report concrete examples supporting this view:
{case}

Discussion point: {point}

Material:
"""
{context}
"""

Notes:
- Keep it under 500 words and explain technical terms plainly.
- List three concrete examples as bullet points.
- Cite the source at the end of each example.
"#;

pub const EXPLORE: &str = r#"Role: explorer
Write a detailed report on one point of an earlier report.

Original question: {query}
Point: {point}

Material:
"""
{context}
"""

Notes:
- Keep it under 500 words.
- Organize the details as bullet points, each starting with "- ".
"#;

/// Fill `{name}` placeholders of `template`. Unknown placeholders and other
/// braces are left as they are.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

/// Format retrieved documents as prompt context.
pub fn format_context(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No relevant material found.".to_string();
    }
    documents
        .iter()
        .map(|doc| match &doc.source {
            Some(source) => format!("{} (source: {source})", doc.content),
            None => doc.content.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bullet or numbered items of a generated report, in order.
pub fn extract_points(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| strip_marker(line.trim()))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") "))
}
