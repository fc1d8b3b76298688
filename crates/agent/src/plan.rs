//! Plan/Step data model (spec §3, §4.6) and the suffix-replacement update
//! rule that is invariant 3 in spec §8.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachment::File;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Created,
    Updated,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub attachments: Vec<File>,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            success: false,
            attachments: Vec::new(),
        }
    }
}

/// A patch parsed from the Planner's/ReAct's JSON output: only the fields a
/// prompt response carries, merged onto the live `Step`/`Plan`.
#[derive(Debug, Clone, Deserialize)]
pub struct StepPatch {
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub attachments: Vec<File>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub message: String,
    pub status: PlanStatus,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(title: impl Into<String>, goal: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            goal: goal.into(),
            language: "en".to_string(),
            message: String::new(),
            status: PlanStatus::Created,
            steps,
        }
    }

    /// First non-terminal step, i.e. the one to run next. Spec §3: "at most
    /// one RUNNING at a time"; a freshly created plan's next step is its
    /// first PENDING one.
    pub fn get_next_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| !s.status.is_terminal())
    }

    pub fn get_next_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| !s.status.is_terminal())
    }

    fn first_pending_index(&self) -> usize {
        self.steps
            .iter()
            .position(|s| !s.status.is_terminal())
            .unwrap_or(self.steps.len())
    }

    /// Replace everything from the first pending step onward with
    /// `new_suffix`, leaving the completed prefix untouched (spec §3, §4.6,
    /// invariant 3 in spec §8).
    pub fn apply_update(&mut self, new_suffix: Vec<Step>) {
        let cut = self.first_pending_index();
        self.steps.truncate(cut);
        self.steps.extend(new_suffix);
        self.status = PlanStatus::Updated;
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn mark_completed(&mut self) {
        self.status = PlanStatus::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(desc: &str) -> Step {
        let mut s = Step::new(desc);
        s.status = StepStatus::Completed;
        s.success = true;
        s
    }

    #[test]
    fn get_next_step_returns_first_non_terminal() {
        let plan = Plan::new("t", "g", vec![done("a"), Step::new("b"), Step::new("c")]);
        assert_eq!(plan.get_next_step().unwrap().description, "b");
    }

    #[test]
    fn apply_update_preserves_completed_prefix_exactly() {
        let mut plan = Plan::new("t", "g", vec![done("a"), done("b"), Step::new("c")]);
        let original_prefix: Vec<String> = plan.steps[..2].iter().map(|s| s.id.clone()).collect();
        plan.apply_update(vec![Step::new("c2"), Step::new("d")]);
        assert_eq!(plan.steps.len(), 4);
        let new_prefix: Vec<String> = plan.steps[..2].iter().map(|s| s.id.clone()).collect();
        assert_eq!(original_prefix, new_prefix);
        assert_eq!(plan.steps[2].description, "c2");
        assert_eq!(plan.steps[3].description, "d");
        assert_eq!(plan.status, PlanStatus::Updated);
    }

    #[test]
    fn empty_plan_has_no_next_step() {
        let plan = Plan::new("t", "g", vec![]);
        assert!(plan.get_next_step().is_none());
        assert!(plan.is_empty());
    }
}
