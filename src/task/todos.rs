//! Syncing an externally maintained todo list onto the checkbox plan.
//!
//! Todo text rarely matches plan titles verbatim, so each todo is mapped to
//! its best-scoring title through the fuzzy matcher. Todos that fall short
//! of the acceptance floor are reported back, with a suggestion when one
//! scored close.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{Result, TaskboardError};
use crate::matcher::{self, MatchResult};
use crate::plan::{parse_checkboxes, set_statuses, CheckboxStatus};

/// Status of a todo as reported by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    #[must_use]
    pub const fn checkbox(self) -> CheckboxStatus {
        match self {
            Self::Pending => CheckboxStatus::Pending,
            Self::InProgress => CheckboxStatus::InProgress,
            Self::Completed => CheckboxStatus::Complete,
        }
    }
}

impl FromStr for TodoStatus {
    type Err = TaskboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" | "complete" => Ok(Self::Completed),
            other => Err(TaskboardError::invalid_argument(
                "status",
                format!("unknown todo status '{other}' (use pending, in_progress or completed)"),
            )),
        }
    }
}

/// One externally reported todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

/// A todo that landed on a plan item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoMatch {
    pub todo: String,
    pub title: String,
    pub score: f64,
    pub status: CheckboxStatus,
    pub changed: bool,
}

/// A todo that matched nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedTodo {
    pub todo: String,
    pub suggestion: Option<MatchResult>,
}

/// Outcome of a todo sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub matched: Vec<TodoMatch>,
    pub unmatched: Vec<UnmatchedTodo>,
    pub warnings: Vec<String>,
}

impl SyncReport {
    /// Number of plan items whose checkbox actually moved.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.matched.iter().filter(|m| m.changed).count()
    }
}

/// Apply `todos` to `plan`, returning the rewritten text and a report.
///
/// A complete item is never reopened by a todo that still reads pending or
/// in progress; the plan is the record of finished work.
pub fn apply_todos(plan: &str, todos: &[TodoItem]) -> Result<(String, SyncReport)> {
    let parsed = parse_checkboxes(plan);
    let titles = parsed.titles();
    let mut report = SyncReport {
        warnings: parsed.warnings(),
        ..SyncReport::default()
    };

    // Status of each title's first item, updated as the batch is applied
    let mut statuses: HashMap<String, CheckboxStatus> = HashMap::new();
    for item in &parsed.items {
        statuses.entry(item.title.clone()).or_insert(item.status);
    }
    let mut updates: HashMap<String, CheckboxStatus> = HashMap::new();

    for todo in todos {
        let Some(best) = matcher::find_best_match(&todo.content, &titles) else {
            report.unmatched.push(UnmatchedTodo {
                todo: todo.content.clone(),
                suggestion: matcher::suggest(&todo.content, &titles),
            });
            continue;
        };

        let current = statuses.get(&best.title).copied().unwrap_or_default();
        let wanted = todo.status.checkbox();
        let target = if current.is_complete() { current } else { wanted };

        if target != current {
            statuses.insert(best.title.clone(), target);
            updates.insert(best.title.clone(), target);
        } else if current.is_complete() && !wanted.is_complete() {
            report.warnings.push(format!(
                "'{}' is already complete; todo '{}' reports {:?} and was ignored",
                best.title, todo.content, todo.status
            ));
        }

        report.matched.push(TodoMatch {
            todo: todo.content.clone(),
            title: best.title,
            score: best.score,
            status: target,
            changed: target != current,
        });
    }

    let text = if updates.is_empty() {
        plan.to_string()
    } else {
        set_statuses(plan, &updates)
    };
    Ok((text, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "- [ ] **Setup database**: postgres\n- [ ] **Build API Endpoints**\n- [x] **Write tests**\n";

    fn todo(content: &str, status: TodoStatus) -> TodoItem {
        TodoItem {
            content: content.to_string(),
            status,
        }
    }

    #[test]
    fn test_fuzzy_todos_update_plan() {
        let todos = vec![
            todo("setup databse", TodoStatus::Completed),
            todo("build api endpoints", TodoStatus::InProgress),
        ];
        let (text, report) = apply_todos(PLAN, &todos).unwrap();

        assert_eq!(
            text,
            "- [x] **Setup database**: postgres\n- [~] **Build API Endpoints**\n- [x] **Write tests**\n"
        );
        assert_eq!(report.matched.len(), 2);
        assert_eq!(report.changed_count(), 2);
        assert_eq!(report.matched[0].title, "Setup database");
        assert!(report.unmatched.is_empty());
    }

    #[test]
    fn test_generic_word_does_not_match() {
        let (text, report) = apply_todos(PLAN, &[todo("API", TodoStatus::Completed)]).unwrap();
        assert_eq!(text, PLAN);
        assert!(report.matched.is_empty());
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].todo, "API");
    }

    #[test]
    fn test_completed_item_is_not_reopened() {
        let (text, report) = apply_todos(PLAN, &[todo("Write tests", TodoStatus::Pending)]).unwrap();
        assert_eq!(text, PLAN);
        assert_eq!(report.matched.len(), 1);
        assert!(!report.matched[0].changed);
        assert_eq!(report.matched[0].status, CheckboxStatus::Complete);
        assert!(report.warnings.iter().any(|w| w.contains("already complete")));
    }

    #[test]
    fn test_unchanged_status_is_not_counted() {
        let (_, report) =
            apply_todos(PLAN, &[todo("Setup database", TodoStatus::Pending)]).unwrap();
        assert_eq!(report.matched[0].score, 1.0);
        assert_eq!(report.changed_count(), 0);
    }

    #[test]
    fn test_later_todos_see_earlier_changes_in_batch() {
        let todos = vec![
            todo("Build API Endpoints", TodoStatus::InProgress),
            todo("build api endpoints", TodoStatus::Completed),
            todo("build the api endpoints", TodoStatus::Pending),
        ];
        let (text, report) = apply_todos(PLAN, &todos).unwrap();

        assert_eq!(
            text,
            "- [ ] **Setup database**: postgres\n- [x] **Build API Endpoints**\n- [x] **Write tests**\n"
        );
        assert_eq!(report.matched.len(), 3);
        assert_eq!(report.changed_count(), 2);
        assert!(!report.matched[2].changed);
        assert!(report.warnings.iter().any(|w| w.contains("already complete")));
    }

    #[test]
    fn test_parse_todo_status() {
        assert_eq!("in-progress".parse::<TodoStatus>().unwrap(), TodoStatus::InProgress);
        assert!("blocked".parse::<TodoStatus>().is_err());
    }
}
