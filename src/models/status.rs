use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress of a module or task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl WorkStatus {
    /// Board columns, left to right.
    pub const COLUMNS: [WorkStatus; 4] = [
        WorkStatus::Todo,
        WorkStatus::InProgress,
        WorkStatus::Blocked,
        WorkStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Todo => "todo",
            WorkStatus::InProgress => "in_progress",
            WorkStatus::Blocked => "blocked",
            WorkStatus::Done => "done",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(WorkStatus::Todo),
            "in_progress" => Ok(WorkStatus::InProgress),
            "blocked" => Ok(WorkStatus::Blocked),
            "done" => Ok(WorkStatus::Done),
            _ => Err(format!(
                "Invalid status '{}'. Valid options: todo, in_progress, blocked, done",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_status_from_str() {
        assert_eq!(WorkStatus::from_str("todo").unwrap(), WorkStatus::Todo);
        assert_eq!(
            WorkStatus::from_str("in-progress").unwrap(),
            WorkStatus::InProgress
        );
        assert_eq!(WorkStatus::from_str("DONE").unwrap(), WorkStatus::Done);
        assert!(WorkStatus::from_str("started").is_err());
    }

    #[test]
    fn test_work_status_serializes_snake_case() {
        let json = serde_json::to_string(&WorkStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
