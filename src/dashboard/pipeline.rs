use serde::Serialize;
use std::fmt;

use crate::models::ProjectStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    /// Gate steps stop here until approved.
    AwaitingApproval,
    Done,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepState::Pending => write!(f, "pending"),
            StepState::Running => write!(f, "running"),
            StepState::AwaitingApproval => write!(f, "awaiting approval"),
            StepState::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStep {
    pub agent: &'static str,
    pub task: &'static str,
    pub gate: bool,
    pub state: StepState,
}

/// (agent, task, approval gate)
const STEPS: [(&str, &str, bool); 6] = [
    ("Requirements Analyst", "Extract entities and auth requirements", false),
    ("Schema Architect", "Design the database schema", true),
    ("API Builder", "Generate routes and handlers", false),
    ("Auth Engineer", "Wire authentication and access rules", false),
    ("Test Writer", "Write integration tests", false),
    ("Deploy Agent", "Provision and deploy the backend", true),
];

/// What a tick or approval changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started(usize),
    AwaitingApproval(usize),
    Completed(usize),
    Approved(usize),
}

impl Transition {
    pub fn step(&self) -> usize {
        match self {
            Transition::Started(i)
            | Transition::AwaitingApproval(i)
            | Transition::Completed(i)
            | Transition::Approved(i) => *i,
        }
    }
}

/// A fixed sequence of agent steps run one at a time.
///
/// Each tick moves the current step forward one state: pending to running,
/// then running to done, or to awaiting approval for a gate step. A waiting
/// gate only moves on [`Pipeline::approve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    steps: Vec<AgentStep>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: STEPS
                .iter()
                .map(|&(agent, task, gate)| AgentStep {
                    agent,
                    task,
                    gate,
                    state: StepState::Pending,
                })
                .collect(),
        }
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    fn current_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.state != StepState::Done)
    }

    /// The first step not yet done.
    pub fn current(&self) -> Option<&AgentStep> {
        self.current_index().map(|i| &self.steps[i])
    }

    pub fn is_finished(&self) -> bool {
        self.current_index().is_none()
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.current(), Some(step) if step.state == StepState::AwaitingApproval)
    }

    /// (done, total)
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .steps
            .iter()
            .filter(|s| s.state == StepState::Done)
            .count();
        (done, self.steps.len())
    }

    /// Lifecycle stage a project has reached in this run: generating once a
    /// step has started, ready once the first gate is through, deployed when
    /// every step is done.
    pub fn project_status(&self) -> ProjectStatus {
        if self.is_finished() {
            return ProjectStatus::Deployed;
        }
        let first_gate_done = self
            .steps
            .iter()
            .find(|s| s.gate)
            .is_some_and(|s| s.state == StepState::Done);
        if first_gate_done {
            ProjectStatus::Ready
        } else if self.steps.iter().any(|s| s.state != StepState::Pending) {
            ProjectStatus::Generating
        } else {
            ProjectStatus::Draft
        }
    }

    pub fn tick(mut self) -> (Self, Option<Transition>) {
        let Some(index) = self.current_index() else {
            return (self, None);
        };

        let step = &mut self.steps[index];
        let transition = match step.state {
            StepState::Pending => {
                step.state = StepState::Running;
                Some(Transition::Started(index))
            }
            StepState::Running if step.gate => {
                step.state = StepState::AwaitingApproval;
                Some(Transition::AwaitingApproval(index))
            }
            StepState::Running => {
                step.state = StepState::Done;
                Some(Transition::Completed(index))
            }
            StepState::AwaitingApproval | StepState::Done => None,
        };
        (self, transition)
    }

    pub fn approve(mut self) -> (Self, Option<Transition>) {
        match self.current_index() {
            Some(index) if self.steps[index].state == StepState::AwaitingApproval => {
                self.steps[index].state = StepState::Done;
                (self, Some(Transition::Approved(index)))
            }
            _ => (self, None),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_waiting(mut pipeline: Pipeline) -> Pipeline {
        for _ in 0..100 {
            if pipeline.is_waiting() || pipeline.is_finished() {
                break;
            }
            pipeline = pipeline.tick().0;
        }
        pipeline
    }

    #[test]
    fn test_steps_start_pending() {
        let pipeline = Pipeline::new();
        assert_eq!(pipeline.progress(), (0, 6));
        assert_eq!(pipeline.steps().iter().filter(|s| s.gate).count(), 2);
        assert!(pipeline
            .steps()
            .iter()
            .all(|s| s.state == StepState::Pending));
    }

    #[test]
    fn test_non_gate_step_runs_then_completes() {
        let (pipeline, first) = Pipeline::new().tick();
        assert_eq!(first, Some(Transition::Started(0)));
        let (pipeline, second) = pipeline.tick();
        assert_eq!(second, Some(Transition::Completed(0)));
        assert_eq!(pipeline.progress(), (1, 6));
    }

    #[test]
    fn test_gate_pauses_until_approved() {
        let pipeline = run_until_waiting(Pipeline::new());
        assert!(pipeline.is_waiting());
        assert_eq!(pipeline.current().unwrap().agent, "Schema Architect");

        let (pipeline, transition) = pipeline.tick();
        assert_eq!(transition, None);
        assert!(pipeline.is_waiting());

        let (pipeline, transition) = pipeline.approve();
        assert_eq!(transition, Some(Transition::Approved(1)));
        assert!(!pipeline.is_waiting());
    }

    #[test]
    fn test_full_run_needs_two_approvals() {
        let mut pipeline = Pipeline::new();
        let mut approvals = 0;
        while !pipeline.is_finished() {
            pipeline = run_until_waiting(pipeline);
            if pipeline.is_waiting() {
                pipeline = pipeline.approve().0;
                approvals += 1;
            }
        }
        assert_eq!(approvals, 2);
        assert_eq!(pipeline.progress(), (6, 6));
        assert_eq!(pipeline.clone().tick().1, None);
    }

    #[test]
    fn test_project_status_follows_gates() {
        let pipeline = Pipeline::new();
        assert_eq!(pipeline.project_status(), ProjectStatus::Draft);

        let pipeline = pipeline.tick().0;
        assert_eq!(pipeline.project_status(), ProjectStatus::Generating);

        let pipeline = run_until_waiting(pipeline);
        assert_eq!(pipeline.project_status(), ProjectStatus::Generating);
        let pipeline = run_until_waiting(pipeline.approve().0);
        assert_eq!(pipeline.current().unwrap().agent, "Deploy Agent");
        assert_eq!(pipeline.project_status(), ProjectStatus::Ready);

        let pipeline = pipeline.approve().0;
        assert_eq!(pipeline.project_status(), ProjectStatus::Deployed);
    }

    #[test]
    fn test_approve_without_gate_is_noop() {
        let pipeline = Pipeline::new();
        let (after, transition) = pipeline.clone().approve();
        assert_eq!(transition, None);
        assert_eq!(after, pipeline);
    }
}
