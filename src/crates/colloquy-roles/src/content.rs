//! Typed views of the state fields the roles exchange

use crate::error::{Result, RoleError};
use serde::{Deserialize, Serialize};

/// State fields written or read by the classroom roles.
pub mod fields {
    pub const REPORTER_CONTENT: &str = "reporter_content";
    pub const REPORT_ID: &str = "report_id";
    pub const CRITIC_CONTENT: &str = "critic_content";
    pub const CRITIC_PASSES: &str = "critic_passes";
    pub const TA_FEEDBACK: &str = "ta_feedback";
    pub const HUMAN_SELECTION: &str = "human_selection";
    pub const POINT_SELECTION: &str = "point_selection";
    pub const EXPLORED_CONTENT: &str = "explored_content";
    pub const CHECK_CONTENT: &str = "check_content";
}

/// One discussion point with its opposing cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticPoint {
    pub title: String,
    pub cases: Vec<String>,
}

/// The critic's output: `{"points": [{"title", "cases"}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticContent {
    #[serde(default)]
    pub points: Vec<CriticPoint>,
}

impl CriticContent {
    /// Parse a model answer. Text around the outermost JSON object, such as
    /// a code fence, is ignored.
    pub fn parse(answer: &str) -> Result<Self> {
        let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) else {
            return Err(RoleError::MalformedCritique("no JSON object in answer".into()));
        };
        if end < start {
            return Err(RoleError::MalformedCritique("no JSON object in answer".into()));
        }
        let content: CriticContent = serde_json::from_str(&answer[start..=end])
            .map_err(|e| RoleError::MalformedCritique(e.to_string()))?;

        if content.points.is_empty() {
            return Err(RoleError::MalformedCritique("no points".into()));
        }
        if let Some(point) = content.points.iter().find(|p| p.cases.is_empty()) {
            return Err(RoleError::MalformedCritique(format!(
                "point '{}' has no cases",
                point.title
            )));
        }
        Ok(content)
    }

    /// The point and case a human selected.
    pub fn select(&self, selection: &HumanSelection) -> Result<(&CriticPoint, &str)> {
        let point = self.points.get(selection.point).ok_or_else(|| {
            RoleError::invalid_selection(
                fields::HUMAN_SELECTION,
                format!("no point {} among {}", selection.point, self.points.len()),
            )
        })?;
        let case = point.cases.get(selection.case).ok_or_else(|| {
            RoleError::invalid_selection(
                fields::HUMAN_SELECTION,
                format!(
                    "point {} has no case {} among {}",
                    selection.point,
                    selection.case,
                    point.cases.len()
                ),
            )
        })?;
        Ok((point, case))
    }

    /// Points as a bulleted list for prompts.
    pub fn to_bullets(&self) -> String {
        self.points
            .iter()
            .map(|p| format!("- {} ({})", p.title, p.cases.join(" / ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A human's choice of critic point and case, `{"point": 0, "case": 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanSelection {
    pub point: usize,
    #[serde(default)]
    pub case: usize,
}

/// A human's choice of report point to explore, `{"point": 2}`.
///
/// `report` defaults to the thread's top-level report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointSelection {
    pub point: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

/// The teaching assistant's verdict on the critic's points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaFeedback {
    pub approved: bool,
    pub comment: String,
}

impl TaFeedback {
    /// Read a verdict: `APPROVE` or `REVISE` on the first non-empty line,
    /// the rest is the comment. Anything else counts as a request to revise.
    pub fn parse(answer: &str) -> Self {
        let mut lines = answer.lines().skip_while(|l| l.trim().is_empty());
        let verdict = lines.next().unwrap_or_default().trim();
        let rest = lines.collect::<Vec<_>>().join("\n").trim().to_string();

        let upper = verdict.to_uppercase();
        if upper.starts_with("APPROVE") {
            Self {
                approved: true,
                comment: rest,
            }
        } else if upper.starts_with("REVISE") {
            Self {
                approved: false,
                comment: rest,
            }
        } else {
            Self {
                approved: false,
                comment: answer.trim().to_string(),
            }
        }
    }
}
