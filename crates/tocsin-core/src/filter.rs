use crate::task::Task;

/// View selection over the task list. Filtering is read-only: it never
/// mutates stored tasks or their insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !task.completed,
            Filter::Completed => task.completed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Active => "active",
            Filter::Completed => "completed",
        }
    }
}

impl std::str::FromStr for Filter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "active" => Ok(Filter::Active),
            "completed" | "done" => Ok(Filter::Completed),
            other => Err(anyhow::anyhow!(
                "invalid filter: {other} (expected all, active, or completed)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Filter;
    use crate::task::{Task, TaskDraft};

    fn task(completed: bool) -> Task {
        let mut task = Task::new(
            1,
            TaskDraft {
                text: "sample".to_string(),
                ..TaskDraft::default()
            },
        );
        task.completed = completed;
        task
    }

    #[test]
    fn all_passes_everything() {
        assert!(Filter::All.matches(&task(false)));
        assert!(Filter::All.matches(&task(true)));
    }

    #[test]
    fn active_and_completed_split_on_the_flag() {
        assert!(Filter::Active.matches(&task(false)));
        assert!(!Filter::Active.matches(&task(true)));
        assert!(Filter::Completed.matches(&task(true)));
        assert!(!Filter::Completed.matches(&task(false)));
    }

    #[test]
    fn parse_accepts_the_three_views() {
        assert_eq!("all".parse::<Filter>().expect("parse"), Filter::All);
        assert_eq!("Active".parse::<Filter>().expect("parse"), Filter::Active);
        assert_eq!(
            "completed".parse::<Filter>().expect("parse"),
            Filter::Completed
        );
        assert!("urgent".parse::<Filter>().is_err());
    }
}
