use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::pipeline::{Pipeline, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Overview,
    Tasks,
    Agents,
    Chat,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Overview => write!(f, "overview"),
            View::Tasks => write!(f, "tasks"),
            View::Agents => write!(f, "agents"),
            View::Chat => write!(f, "chat"),
        }
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overview" => Ok(View::Overview),
            "tasks" => Ok(View::Tasks),
            "agents" => Ok(View::Agents),
            "chat" => Ok(View::Chat),
            _ => Err(format!(
                "Invalid view '{}'. Valid options: overview, tasks, agents, chat",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    /// Tick count when the entry was written.
    pub tick: u64,
    pub agent: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SelectProject(Option<Uuid>),
    SetView(View),
    Tick,
    Approve,
    ResetPipeline,
    PostChat(String),
}

/// Immutable dashboard snapshot. Produced only by [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct DashboardState {
    pub selected_project: Option<Uuid>,
    pub view: View,
    pub pipeline: Pipeline,
    pub activity: Vec<ActivityEntry>,
    pub chat: Vec<ChatMessage>,
    pub ticks: u64,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }
}

fn describe(pipeline: &Pipeline, transition: &Transition) -> ActivityEntry {
    let step = &pipeline.steps()[transition.step()];
    let message = match transition {
        Transition::Started(_) => format!("Started: {}", step.task),
        Transition::AwaitingApproval(_) => format!("Waiting for approval: {}", step.task),
        Transition::Completed(_) => format!("Finished: {}", step.task),
        Transition::Approved(_) => format!("Approved: {}", step.task),
    };
    ActivityEntry {
        tick: 0,
        agent: step.agent.to_string(),
        message,
    }
}

/// Reply from whichever agent currently holds the pipeline.
fn canned_reply(pipeline: &Pipeline) -> ChatMessage {
    let (author, text) = match pipeline.current() {
        Some(step) if pipeline.is_waiting() => (
            step.agent,
            format!("Noted. Approve \"{}\" when you're ready and I'll continue.", step.task),
        ),
        Some(step) => (
            step.agent,
            format!("Got it. I'll take that into account while I {}.", step.task.to_lowercase()),
        ),
        None => (
            "Deploy Agent",
            "Your backend is deployed. Start a new run to apply further changes.".to_string(),
        ),
    };
    ChatMessage {
        role: ChatRole::Agent,
        author: author.to_string(),
        text,
    }
}

fn with_transition(
    mut state: DashboardState,
    pipeline: Pipeline,
    transition: Option<Transition>,
) -> DashboardState {
    if let Some(transition) = transition {
        let mut entry = describe(&pipeline, &transition);
        entry.tick = state.ticks;
        state.activity.push(entry);
    }
    state.pipeline = pipeline;
    state
}

/// Pure transition function for the dashboard.
pub fn reduce(state: &DashboardState, action: Action) -> DashboardState {
    let mut next = state.clone();

    match action {
        Action::SelectProject(project) => {
            if project != next.selected_project {
                next.selected_project = project;
                next.pipeline = Pipeline::new();
                next.activity.clear();
                next.chat.clear();
            }
            next
        }
        Action::SetView(view) => {
            next.view = view;
            next
        }
        Action::Tick => {
            next.ticks += 1;
            let (pipeline, transition) = next.pipeline.clone().tick();
            with_transition(next, pipeline, transition)
        }
        Action::Approve => {
            let (pipeline, transition) = next.pipeline.clone().approve();
            with_transition(next, pipeline, transition)
        }
        Action::ResetPipeline => {
            next.pipeline = Pipeline::new();
            next.activity.push(ActivityEntry {
                tick: next.ticks,
                agent: "System".to_string(),
                message: "Pipeline reset".to_string(),
            });
            next
        }
        Action::PostChat(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                return next;
            }
            next.chat.push(ChatMessage {
                role: ChatRole::User,
                author: "You".to_string(),
                text,
            });
            let reply = canned_reply(&next.pipeline);
            next.chat.push(reply);
            next
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::pipeline::StepState;

    #[test]
    fn test_reduce_does_not_touch_input() {
        let state = DashboardState::new();
        let next = reduce(&state, Action::Tick);
        assert_eq!(state.ticks, 0);
        assert_eq!(next.ticks, 1);
        assert_eq!(next.pipeline.steps()[0].state, StepState::Running);
    }

    #[test]
    fn test_every_transition_is_logged() {
        let mut state = DashboardState::new();
        for _ in 0..4 {
            state = reduce(&state, Action::Tick);
        }
        let messages: Vec<&str> = state.activity.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Started: Extract entities and auth requirements",
                "Finished: Extract entities and auth requirements",
                "Started: Design the database schema",
                "Waiting for approval: Design the database schema",
            ]
        );
        assert_eq!(state.activity[3].tick, 4);

        let idle = reduce(&state, Action::Tick);
        assert_eq!(idle.activity.len(), 4);

        let approved = reduce(&idle, Action::Approve);
        assert_eq!(approved.activity.last().unwrap().agent, "Schema Architect");
        assert!(!approved.pipeline.is_waiting());
    }

    #[test]
    fn test_post_chat_appends_message_and_reply() {
        let state = reduce(&DashboardState::new(), Action::PostChat("Add billing".into()));
        assert_eq!(state.chat.len(), 2);
        assert_eq!(state.chat[0].role, ChatRole::User);
        assert_eq!(state.chat[1].role, ChatRole::Agent);
        assert_eq!(state.chat[1].author, "Requirements Analyst");

        let unchanged = reduce(&state, Action::PostChat("   ".into()));
        assert_eq!(unchanged.chat.len(), 2);
    }

    #[test]
    fn test_selecting_another_project_resets_run() {
        let project = Uuid::new_v4();
        let mut state = reduce(&DashboardState::new(), Action::SelectProject(Some(project)));
        state = reduce(&state, Action::Tick);

        let same = reduce(&state, Action::SelectProject(Some(project)));
        assert_eq!(same.activity.len(), 1);

        let other = reduce(&state, Action::SelectProject(Some(Uuid::new_v4())));
        assert!(other.activity.is_empty());
        assert_eq!(other.pipeline, Pipeline::new());
    }

    #[test]
    fn test_set_view_and_reset() {
        let state = reduce(&DashboardState::new(), Action::SetView(View::Agents));
        assert_eq!(state.view, View::Agents);
        assert_eq!("CHAT".parse::<View>().unwrap(), View::Chat);

        let state = reduce(&reduce(&state, Action::Tick), Action::ResetPipeline);
        assert_eq!(state.pipeline, Pipeline::new());
        assert_eq!(state.activity.last().unwrap().message, "Pipeline reset");
    }
}
