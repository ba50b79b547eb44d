//! Report tree stored inside a thread's state
//!
//! Reports contain points, and any point may get a detailed child report,
//! which has points of its own. Instead of nesting reports inside each other,
//! the tree is a flat map keyed by report id; a child names its parent by id
//! and a point names its detail report by id:
//!
//! ```text
//! reports: {
//!   "r1": { parent: null, depth: 0, points: [ {title: "a", detail: "r2"}, {title: "b"} ] }
//!   "r2": { parent: "r1", parent_point: 0, depth: 1, points: [...] }
//! }
//! ```
//!
//! The tree lives in the state field [`REPORTS_FIELD`], so it is scoped to one
//! thread and persisted with that thread's checkpoint. Depth is bounded by the
//! caller of [`ReportTree::add_detail`].

use crate::state::{State, StateExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub const REPORTS_FIELD: &str = "reports";

pub type ReportId = String;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Unknown report '{0}'")]
    UnknownReport(ReportId),

    #[error("Report '{report}' has {len} points, no point {point}")]
    UnknownPoint {
        report: ReportId,
        point: usize,
        len: usize,
    },

    #[error("Point {point} of report '{report}' already has a detailed report")]
    DetailExists { report: ReportId, point: usize },

    #[error("Detailed report would exceed the maximum depth of {max}")]
    DepthExceeded { max: usize },

    #[error("Malformed report tree: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPoint {
    pub title: String,
    /// Id of the detailed report written for this point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReportId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub parent: Option<ReportId>,
    /// Index of the parent's point this report details.
    pub parent_point: Option<usize>,
    pub depth: usize,
    pub title: String,
    pub content: String,
    pub points: Vec<ReportPoint>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportTree {
    root: Option<ReportId>,
    reports: BTreeMap<ReportId, Report>,
}

impl ReportTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the tree from `state`, or an empty tree if the field is absent.
    pub fn from_state(state: &State) -> Result<Self, ReportError> {
        Ok(state.typed_field(REPORTS_FIELD)?.unwrap_or_default())
    }

    pub fn to_value(&self) -> Result<Value, ReportError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Add a top-level report. The first one added becomes the root.
    pub fn add_root(
        &mut self,
        title: impl Into<String>,
        content: impl Into<String>,
        points: Vec<String>,
    ) -> ReportId {
        let report = Self::build(None, None, 0, title.into(), content.into(), points);
        let id = report.id.clone();
        self.root.get_or_insert_with(|| id.clone());
        self.reports.insert(id.clone(), report);
        id
    }

    /// Attach a detailed report to point `point` of report `parent`.
    pub fn add_detail(
        &mut self,
        parent: &str,
        point: usize,
        content: impl Into<String>,
        points: Vec<String>,
        max_depth: usize,
    ) -> Result<ReportId, ReportError> {
        let parent_report = self
            .reports
            .get(parent)
            .ok_or_else(|| ReportError::UnknownReport(parent.to_string()))?;
        let parent_point =
            parent_report
                .points
                .get(point)
                .ok_or_else(|| ReportError::UnknownPoint {
                    report: parent.to_string(),
                    point,
                    len: parent_report.points.len(),
                })?;
        if parent_point.detail.is_some() {
            return Err(ReportError::DetailExists {
                report: parent.to_string(),
                point,
            });
        }
        let depth = parent_report.depth + 1;
        if depth > max_depth {
            return Err(ReportError::DepthExceeded { max: max_depth });
        }

        let report = Self::build(
            Some(parent.to_string()),
            Some(point),
            depth,
            parent_point.title.clone(),
            content.into(),
            points,
        );
        let id = report.id.clone();
        self.reports.insert(id.clone(), report);
        if let Some(p) = self
            .reports
            .get_mut(parent)
            .and_then(|r| r.points.get_mut(point))
        {
            p.detail = Some(id.clone());
        }
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Report> {
        self.reports.get(id)
    }

    pub fn root(&self) -> Option<&Report> {
        self.root.as_deref().and_then(|id| self.reports.get(id))
    }

    /// Detailed reports hanging off `id`, in point order.
    pub fn children(&self, id: &str) -> Vec<&Report> {
        self.reports
            .get(id)
            .map(|r| {
                r.points
                    .iter()
                    .filter_map(|p| p.detail.as_deref())
                    .filter_map(|child| self.reports.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reports from the root down to `id`, inclusive.
    pub fn path(&self, id: &str) -> Vec<&Report> {
        let mut path = Vec::new();
        let mut cursor = self.reports.get(id);
        while let Some(report) = cursor {
            path.push(report);
            cursor = report.parent.as_deref().and_then(|p| self.reports.get(p));
        }
        path.reverse();
        path
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    fn build(
        parent: Option<ReportId>,
        parent_point: Option<usize>,
        depth: usize,
        title: String,
        content: String,
        points: Vec<String>,
    ) -> Report {
        Report {
            id: Uuid::new_v4().to_string(),
            parent,
            parent_point,
            depth,
            title,
            content,
            points: points
                .into_iter()
                .map(|title| ReportPoint {
                    title,
                    detail: None,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("point {i}")).collect()
    }

    #[test]
    fn test_root_and_detail() {
        let mut tree = ReportTree::new();
        let root = tree.add_root("trade policy", "draft", points(3));
        let child = tree.add_detail(&root, 1, "detail", points(2), 2).unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.root().map(|r| r.id.as_str()), Some(root.as_str()));

        let child_report = tree.get(&child).unwrap();
        assert_eq!(child_report.parent.as_deref(), Some(root.as_str()));
        assert_eq!(child_report.parent_point, Some(1));
        assert_eq!(child_report.depth, 1);
        assert_eq!(child_report.title, "point 1");

        assert_eq!(tree.get(&root).unwrap().points[1].detail.as_deref(), Some(child.as_str()));
        assert_eq!(tree.children(&root).len(), 1);
        let path: Vec<_> = tree.path(&child).iter().map(|r| r.id.clone()).collect();
        assert_eq!(path, vec![root, child]);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut tree = ReportTree::new();
        let root = tree.add_root("t", "c", points(1));
        let child = tree.add_detail(&root, 0, "c", points(1), 1).unwrap();

        let err = tree.add_detail(&child, 0, "c", points(1), 1).unwrap_err();
        assert!(matches!(err, ReportError::DepthExceeded { max: 1 }));
    }

    #[test]
    fn test_invalid_targets() {
        let mut tree = ReportTree::new();
        let root = tree.add_root("t", "c", points(2));

        assert!(matches!(
            tree.add_detail("missing", 0, "c", vec![], 3),
            Err(ReportError::UnknownReport(_))
        ));
        assert!(matches!(
            tree.add_detail(&root, 5, "c", vec![], 3),
            Err(ReportError::UnknownPoint { point: 5, len: 2, .. })
        ));

        tree.add_detail(&root, 0, "c", vec![], 3).unwrap();
        assert!(matches!(
            tree.add_detail(&root, 0, "again", vec![], 3),
            Err(ReportError::DetailExists { point: 0, .. })
        ));
    }

    #[test]
    fn test_state_round_trip() {
        let mut tree = ReportTree::new();
        let root = tree.add_root("t", "c", points(2));
        tree.add_detail(&root, 0, "d", points(1), 2).unwrap();

        let mut state = State::new();
        state.insert(REPORTS_FIELD.into(), tree.to_value().unwrap());
        assert_eq!(ReportTree::from_state(&state).unwrap(), tree);
        assert!(ReportTree::from_state(&State::new()).unwrap().is_empty());
    }
}
