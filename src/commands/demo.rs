use clap::Args;
use std::time::Duration;

use super::{confirm, resolve_project, CommandResult, Session};
use backforge::dashboard::{
    Action, DashboardState, DashboardStore, ProjectLifecycle, StepState, View,
};
use backforge::models::ProjectStatus;

#[derive(Args)]
pub struct DemoCommand {
    /// Project to run the pipeline for (ID, code or name). Its status
    /// follows the run from draft to deployed.
    #[arg(long, short)]
    project: Option<String>,

    /// Milliseconds between pipeline ticks
    #[arg(long, default_value = "400")]
    interval_ms: u64,

    /// Approve gates without asking
    #[arg(long, short = 'y')]
    yes: bool,

    /// Send a chat message to the running agent first
    #[arg(long)]
    chat: Option<String>,
}

fn print_steps(state: &DashboardState) {
    let (done, total) = state.pipeline.progress();
    println!("\nPipeline {}/{}", done, total);
    for step in state.pipeline.steps() {
        let marker = match step.state {
            StepState::Pending => " ",
            StepState::Running => ">",
            StepState::AwaitingApproval => "?",
            StepState::Done => "x",
        };
        let gate = if step.gate { " (gate)" } else { "" };
        println!("  [{}] {:<22} {}{}", marker, step.agent, step.task, gate);
    }
}

impl DemoCommand {
    /// Runs the agent pipeline simulation to completion, printing the
    /// activity feed as it grows.
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        let dashboard = DashboardStore::default();

        let projects = session.projects().await?;
        let mut lifecycle = None;
        if let Some(identifier) = &self.project {
            let project = resolve_project(&projects.projects().await, identifier)?;
            println!("Generating backend for {} ({})", project.name, project.code);
            dashboard.dispatch(Action::SelectProject(Some(project.id)));

            let tracker = ProjectLifecycle::new(&projects, project.id);
            let begun = tracker.begin().await;
            session.settle(begun)?;
            lifecycle = Some((tracker, ProjectStatus::Draft));
        }
        dashboard.dispatch(Action::SetView(View::Agents));

        if let Some(message) = &self.chat {
            let state = dashboard.dispatch(Action::PostChat(message.clone()));
            for line in &state.chat {
                println!("{}: {}", line.author, line.text);
            }
        }

        let mut printed = 0;
        let mut interval = tokio::time::interval(Duration::from_millis(self.interval_ms.max(1)));

        loop {
            let state = dashboard.snapshot();
            for entry in &state.activity[printed..] {
                println!("[{:>3}] {:<22} {}", entry.tick, entry.agent, entry.message);
            }
            printed = state.activity.len();

            if let Some((tracker, shown)) = &mut lifecycle {
                let followed = tracker.follow(&state.pipeline).await;
                let project = session.settle(followed)?;
                if project.status != *shown {
                    println!("      Project {} is now {}", project.code, project.status);
                    *shown = project.status;
                }
            }

            if state.pipeline.is_finished() {
                break;
            }

            if state.pipeline.is_waiting() {
                print_steps(&state);
                let approve = self.yes || confirm("Approve and continue?")?;
                if !approve {
                    println!("Pipeline paused. Run the demo again to start over.");
                    return Ok(());
                }
                dashboard.dispatch(Action::Approve);
                continue;
            }

            interval.tick().await;
            dashboard.dispatch(Action::Tick);
        }

        print_steps(&dashboard.snapshot());
        println!("\nAll agents finished.");
        Ok(())
    }
}
