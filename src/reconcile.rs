//! Reconciliation of unchecked plan items at completion time.
//!
//! When an agent claims DONE while its plan still has unchecked items, the
//! reconciliation mode decides what happens:
//!
//! - `strict`: reject, naming how many items are unchecked.
//! - `auto_complete`: check every remaining item and list them.
//! - `reconcile`: accept, check every remaining item and attach an
//!   explanation to each of them.
//! - `force`: accept, leave the plan alone, and add a loud warning section.
//!   This is the only accepting mode that leaves boxes unchecked.
//!
//! [`reconcile`] is pure; applying a plan rewrite is up to the caller, who
//! does it under the task lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::error::{Result, TaskboardError};
use crate::plan::CheckboxItem;

/// Explanation recorded for an unchecked item nobody explained.
pub const DEFAULT_EXPLANATION: &str = "completed via alternative approach";

/// Policy for unchecked items on a DONE claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationMode {
    #[default]
    Strict,
    AutoComplete,
    Reconcile,
    Force,
}

impl ReconciliationMode {
    /// Parse a mode name, falling back to [`ReconciliationMode::Reconcile`]
    /// for anything unrecognized.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::from_name(value).unwrap_or_else(|| {
            warn!(mode = value, "Unknown reconciliation mode, using 'reconcile'");
            Self::Reconcile
        })
    }

    /// Exact parse; `None` for unknown names.
    #[must_use]
    pub fn from_name(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "strict" => Some(Self::Strict),
            "auto_complete" | "autocomplete" => Some(Self::AutoComplete),
            "reconcile" => Some(Self::Reconcile),
            "force" => Some(Self::Force),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::AutoComplete => "auto_complete",
            Self::Reconcile => "reconcile",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for ReconciliationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explanation attached to one reconciled item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledItem {
    pub title: String,
    pub explanation: String,
}

/// What reconciliation decided for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub mode: ReconciliationMode,
    pub total_items: usize,
    pub checked_items: usize,
    /// Items accounted for by explanation and checked off by the caller
    /// (`reconcile` mode).
    pub reconciled: Vec<ReconciledItem>,
    /// Items to be checked off by the caller (`auto_complete` mode).
    pub auto_completed: Vec<String>,
    /// Items left unchecked on purpose (`force` mode).
    pub forced_unchecked: Vec<String>,
    /// Markdown section to fold into the completion summary.
    pub report: String,
}

impl ReconciliationOutcome {
    /// Whether the caller must rewrite the plan before accepting.
    #[must_use]
    pub fn rewrites_plan(&self) -> bool {
        !self.auto_completed.is_empty() || !self.reconciled.is_empty()
    }

    /// Titles the caller has to check off, in document order.
    #[must_use]
    pub fn titles_to_check(&self) -> Vec<&str> {
        self.auto_completed
            .iter()
            .map(String::as_str)
            .chain(self.reconciled.iter().map(|r| r.title.as_str()))
            .collect()
    }

    /// Number of items reconciled by explanation.
    #[must_use]
    pub fn reconciled_count(&self) -> usize {
        self.reconciled.len()
    }
}

/// Decide what to do with the unchecked items of a plan.
///
/// In-progress items count as unchecked. Explanations are matched against
/// titles exactly; explanations for titles that are not unchecked are
/// ignored with a warning.
///
/// # Errors
///
/// [`TaskboardError::UncheckedItems`] in `strict` mode when anything is
/// unchecked.
pub fn reconcile(
    items: &[CheckboxItem],
    mode: ReconciliationMode,
    explanations: &HashMap<String, String>,
) -> Result<ReconciliationOutcome> {
    let total_items = items.len();
    let checked_items = items.iter().filter(|i| i.status.is_complete()).count();
    let unchecked: Vec<String> = items
        .iter()
        .filter(|i| !i.status.is_complete())
        .map(|i| i.title.clone())
        .collect();

    let mut outcome = ReconciliationOutcome {
        mode,
        total_items,
        checked_items,
        reconciled: Vec::new(),
        auto_completed: Vec::new(),
        forced_unchecked: Vec::new(),
        report: String::new(),
    };

    if unchecked.is_empty() {
        outcome.report = format!("All {total_items} plan items checked.");
        return Ok(outcome);
    }

    for title in explanations.keys() {
        if !unchecked.contains(title) {
            warn!(title = %title, "Ignoring explanation for an item that is not unchecked");
        }
    }

    match mode {
        ReconciliationMode::Strict => {
            return Err(TaskboardError::UncheckedItems {
                count: unchecked.len(),
                titles: unchecked,
            });
        }
        ReconciliationMode::AutoComplete => {
            outcome.report = format!(
                "## Auto-completed items\n\nAuto-completed {} unchecked item(s):\n{}",
                unchecked.len(),
                bullet_list(&unchecked)
            );
            outcome.auto_completed = unchecked;
        }
        ReconciliationMode::Reconcile => {
            outcome.reconciled = unchecked
                .into_iter()
                .map(|title| {
                    let explanation = explanations
                        .get(&title)
                        .map(|e| e.trim())
                        .filter(|e| !e.is_empty())
                        .unwrap_or(DEFAULT_EXPLANATION)
                        .to_string();
                    ReconciledItem { title, explanation }
                })
                .collect();
            let lines: Vec<String> = outcome
                .reconciled
                .iter()
                .map(|r| format!("- **{}**: {}", r.title, r.explanation))
                .collect();
            outcome.report = format!(
                "## Reconciliation\n\n{total_items} planned / {checked_items} checked / {} reconciled\n\n{}",
                outcome.reconciled.len(),
                lines.join("\n")
            );
        }
        ReconciliationMode::Force => {
            outcome.report = format!(
                "## WARNING: FORCED COMPLETION\n\n{} of {total_items} plan items were NOT completed and remain unchecked:\n{}",
                unchecked.len(),
                bullet_list(&unchecked)
            );
            outcome.forced_unchecked = unchecked;
        }
    }

    Ok(outcome)
}

fn bullet_list(titles: &[String]) -> String {
    titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::plan::parse_checkboxes;

    const PLAN: &str = r#"- [x] **Setup Environment**: toolchain
- [ ] **Write Documentation**: README
- [~] **Performance Testing**: load test
"#;

    fn items() -> Vec<CheckboxItem> {
        parse_checkboxes(PLAN).items
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(ReconciliationMode::parse("strict"), ReconciliationMode::Strict);
        assert_eq!(ReconciliationMode::parse("AUTO-COMPLETE"), ReconciliationMode::AutoComplete);
        assert_eq!(ReconciliationMode::parse("force"), ReconciliationMode::Force);
        assert_eq!(ReconciliationMode::parse("yolo"), ReconciliationMode::Reconcile);
        assert_eq!(ReconciliationMode::from_name("yolo"), None);
        assert_eq!(ReconciliationMode::default(), ReconciliationMode::Strict);
    }

    #[test]
    fn test_strict_rejects_unchecked() {
        let err = reconcile(&items(), ReconciliationMode::Strict, &HashMap::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReconciliationRejected);
        assert!(err.to_string().contains("2 unchecked items"));
    }

    #[test]
    fn test_all_checked_passes_every_mode() {
        let done = parse_checkboxes("- [x] **A**\n- [x] **B**\n").items;
        for mode in [
            ReconciliationMode::Strict,
            ReconciliationMode::AutoComplete,
            ReconciliationMode::Reconcile,
            ReconciliationMode::Force,
        ] {
            let outcome = reconcile(&done, mode, &HashMap::new()).unwrap();
            assert!(!outcome.rewrites_plan());
            assert!(outcome.report.contains("All 2 plan items checked"));
        }
    }

    #[test]
    fn test_auto_complete_lists_titles() {
        let outcome = reconcile(&items(), ReconciliationMode::AutoComplete, &HashMap::new()).unwrap();
        assert!(outcome.rewrites_plan());
        assert_eq!(
            outcome.auto_completed,
            vec!["Write Documentation", "Performance Testing"]
        );
        assert!(outcome.report.contains("- Write Documentation"));
        assert!(outcome.report.contains("- Performance Testing"));
    }

    #[test]
    fn test_reconcile_totals_and_explanations() {
        let mut explanations = HashMap::new();
        explanations.insert(
            "Performance Testing".to_string(),
            "covered by the staging benchmark suite".to_string(),
        );
        let outcome = reconcile(&items(), ReconciliationMode::Reconcile, &explanations).unwrap();

        assert_eq!(outcome.total_items, 3);
        assert_eq!(outcome.checked_items, 1);
        assert_eq!(outcome.reconciled_count(), 2);
        assert!(outcome.report.contains("3 planned / 1 checked / 2 reconciled"));
        assert!(outcome
            .report
            .contains("- **Performance Testing**: covered by the staging benchmark suite"));
        assert!(outcome
            .report
            .contains(&format!("- **Write Documentation**: {DEFAULT_EXPLANATION}")));
        assert!(outcome.rewrites_plan());
        assert_eq!(
            outcome.titles_to_check(),
            vec!["Write Documentation", "Performance Testing"]
        );
    }

    #[test]
    fn test_blank_explanation_gets_default() {
        let mut explanations = HashMap::new();
        explanations.insert("Write Documentation".to_string(), "   ".to_string());
        let outcome = reconcile(&items(), ReconciliationMode::Reconcile, &explanations).unwrap();
        assert_eq!(outcome.reconciled[0].explanation, DEFAULT_EXPLANATION);
    }

    #[test]
    fn test_force_warns_loudly() {
        let outcome = reconcile(&items(), ReconciliationMode::Force, &HashMap::new()).unwrap();
        assert!(!outcome.rewrites_plan());
        assert!(outcome.titles_to_check().is_empty());
        assert_eq!(outcome.forced_unchecked.len(), 2);
        assert!(outcome.report.starts_with("## WARNING"));
        assert!(outcome.report.contains("- Write Documentation"));
    }
}
