//! Checkbox plan parsing and rewriting.
//!
//! A plan is free-form markdown. Only lines of the form
//!
//! ```text
//! <indent>- [ |x|~] **<title>**: <description>
//! ```
//!
//! are tracked. Lines that look like checkboxes but break the grammar are
//! reported as [`MalformedLine`]s instead of being dropped.
//!
//! Everything here is a single pass over the text; rewrites only touch the
//! bracket character of the target line so every other byte survives.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use crate::error::{Result, TaskboardError};
use crate::task::document::garbled_reason;

/// Columns a tab counts for when ranking indentation.
const TAB_WIDTH: usize = 4;

// ============================================================================
// Types
// ============================================================================

/// Three-state status of a checkbox item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxStatus {
    /// `[ ]`
    #[default]
    Pending,
    /// `[~]`
    InProgress,
    /// `[x]`
    Complete,
}

impl CheckboxStatus {
    /// Character written between the brackets.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Pending => ' ',
            Self::InProgress => '~',
            Self::Complete => 'x',
        }
    }

    /// Parse the character found between the brackets.
    #[must_use]
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Pending),
            '~' => Some(Self::InProgress),
            'x' => Some(Self::Complete),
            _ => None,
        }
    }

    /// Whether the item counts as done.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for CheckboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// One trackable step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckboxItem {
    /// Rank of the leading whitespace among all items (0 = outermost).
    pub indent_level: usize,
    /// Short label; identity of the item for updates.
    pub title: String,
    /// Inline description plus deeper-indented continuation lines.
    pub description: String,
    /// Current status.
    pub status: CheckboxStatus,
    /// 1-based line number in the source text.
    pub line: usize,
}

/// A line that resembles a checkbox but does not follow the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedLine {
    /// 1-based line number.
    pub line: usize,
    /// The offending line, without its line terminator.
    pub content: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Result of parsing a plan document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPlan {
    pub items: Vec<CheckboxItem>,
    pub malformed: Vec<MalformedLine>,
}

impl ParsedPlan {
    /// Number of checkbox items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the plan has no checkbox items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that are not complete (pending or in progress).
    pub fn unchecked(&self) -> impl Iterator<Item = &CheckboxItem> {
        self.items.iter().filter(|i| !i.status.is_complete())
    }

    /// Number of complete items.
    #[must_use]
    pub fn checked_count(&self) -> usize {
        self.items.iter().filter(|i| i.status.is_complete()).count()
    }

    /// All item titles in document order.
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.items.iter().map(|i| i.title.clone()).collect()
    }

    /// Low-severity warnings for every malformed line.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.malformed
            .iter()
            .map(|m| format!("line {}: {} ({})", m.line, m.reason, m.content.trim()))
            .collect()
    }
}

// ============================================================================
// Regexes
// ============================================================================

fn checkbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\s*)-\s*\[( |x|~)\]\s+(.+)$").expect("checkbox regex is valid")
    })
}

fn checkbox_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*[-*+]\s*\[").expect("checkbox-like regex is valid")
    })
}

fn bold_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\*\*(.*?)\*\*\s*:?\s*(.*)$").expect("bold title regex is valid")
    })
}

// ============================================================================
// Parsing
// ============================================================================

/// Split text into lines, dropping a trailing `\r` from each.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

fn indent_width(indent: &str) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// Split the text after the brackets into `(title, description)`.
///
/// Returns `None` when there is no title at all or the bold title is empty.
fn split_title(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    if let Some(caps) = bold_title_re().captures(rest) {
        let title = caps.get(1).map_or("", |m| m.as_str()).trim();
        if title.is_empty() {
            return None;
        }
        let description = caps.get(2).map_or("", |m| m.as_str()).trim();
        return Some((title.to_string(), description.to_string()));
    }
    Some((rest.to_string(), String::new()))
}

/// Explain why a checkbox-like line failed the strict grammar.
fn malformed_reason(line: &str) -> String {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('-') {
        return "checkbox must start with '-'".to_string();
    }
    let after_dash = trimmed[1..].trim_start();
    let Some(inner) = after_dash.strip_prefix('[') else {
        return "missing opening bracket".to_string();
    };
    let Some(close) = inner.find(']') else {
        return "missing closing bracket".to_string();
    };
    let marker = &inner[..close];
    match marker {
        "X" => "capital 'X' is not a valid marker; use lowercase 'x'".to_string(),
        " " | "x" | "~" => {
            let rest = &inner[close + 1..];
            if rest.trim().is_empty() {
                "checkbox has no title".to_string()
            } else if !rest.starts_with(char::is_whitespace) {
                "missing space between ']' and the title".to_string()
            } else {
                "empty bold title".to_string()
            }
        }
        m if m.chars().all(char::is_whitespace) => {
            "brackets must contain exactly one character".to_string()
        }
        m => format!("unknown marker '{m}'; use ' ', '~' or 'x'"),
    }
}

/// Parse every checkbox item of a plan document.
///
/// # Example
///
/// ```
/// use taskboard::plan::{parse_checkboxes, CheckboxStatus};
///
/// let plan = "# Plan\n- [x] **Setup**: create repo\n  - [~] **Schema**: tables\n- [ ] **Deploy**\n";
/// let parsed = parse_checkboxes(plan);
/// assert_eq!(parsed.items.len(), 3);
/// assert_eq!(parsed.items[1].indent_level, 1);
/// assert_eq!(parsed.items[1].status, CheckboxStatus::InProgress);
/// assert!(parsed.malformed.is_empty());
/// ```
#[must_use]
pub fn parse_checkboxes(text: &str) -> ParsedPlan {
    let mut items: Vec<CheckboxItem> = Vec::new();
    let mut widths: Vec<usize> = Vec::new();
    let mut malformed = Vec::new();
    // Width of the most recent item, for description continuation lines.
    let mut open_item: Option<usize> = None;

    for (idx, line) in lines(text).enumerate() {
        let line_no = idx + 1;

        if let Some(caps) = checkbox_re().captures(line) {
            let indent = caps.get(1).map_or("", |m| m.as_str());
            let marker = caps
                .get(2)
                .and_then(|m| m.as_str().chars().next())
                .and_then(CheckboxStatus::from_marker);
            let rest = caps.get(3).map_or("", |m| m.as_str());

            match (marker, split_title(rest)) {
                (Some(status), Some((title, description))) => {
                    let width = indent_width(indent);
                    items.push(CheckboxItem {
                        indent_level: 0,
                        title,
                        description,
                        status,
                        line: line_no,
                    });
                    widths.push(width);
                    open_item = Some(width);
                }
                _ => {
                    malformed.push(MalformedLine {
                        line: line_no,
                        content: line.to_string(),
                        reason: malformed_reason(line),
                    });
                    open_item = None;
                }
            }
            continue;
        }

        if checkbox_like_re().is_match(line) {
            malformed.push(MalformedLine {
                line: line_no,
                content: line.to_string(),
                reason: malformed_reason(line),
            });
            open_item = None;
            continue;
        }

        // Continuation of the previous item's description
        match open_item {
            Some(width) if !line.trim().is_empty() => {
                let line_width = indent_width(&line[..line.len() - line.trim_start().len()]);
                if line_width > width {
                    if let Some(item) = items.last_mut() {
                        let extra = line.trim().trim_start_matches("- ").trim();
                        if !item.description.is_empty() {
                            item.description.push('\n');
                        }
                        item.description.push_str(extra);
                    }
                } else {
                    open_item = None;
                }
            }
            _ => open_item = None,
        }
    }

    let ranks: BTreeSet<usize> = widths.iter().copied().collect();
    let ranks: Vec<usize> = ranks.into_iter().collect();
    for (item, width) in items.iter_mut().zip(widths) {
        item.indent_level = ranks.binary_search(&width).unwrap_or(0);
    }

    ParsedPlan { items, malformed }
}

/// Count checkbox items without keeping them.
#[must_use]
pub fn count_checkboxes(text: &str) -> usize {
    lines(text)
        .filter(|line| {
            checkbox_re()
                .captures(line)
                .and_then(|c| c.get(3))
                .is_some_and(|rest| split_title(rest.as_str()).is_some())
        })
        .count()
}

/// Pure equality check between a declared and an observed step count.
#[must_use]
pub const fn validate_step_count(expected: i64, actual: i64) -> bool {
    expected == actual
}

/// Parse a plan and reject it when it has no checkbox items at all, or
/// when it carries bytes no plan document may contain (NUL, control
/// characters such as terminal color codes, replacement characters).
pub fn validate_plan(text: &str) -> Result<ParsedPlan> {
    if let Some(reason) = garbled_reason(text.as_bytes()) {
        return Err(TaskboardError::plan_format(format!(
            "plan text {reason}; strip terminal escapes and binary content"
        )));
    }
    let parsed = parse_checkboxes(text);
    if parsed.is_empty() {
        let detail = if parsed.malformed.is_empty() {
            "no checkbox items found".to_string()
        } else {
            format!(
                "no valid checkbox items found; {} malformed line(s): {}",
                parsed.malformed.len(),
                parsed.warnings().join("; ")
            )
        };
        return Err(TaskboardError::plan_format(detail));
    }
    Ok(parsed)
}

// ============================================================================
// Rewriting
// ============================================================================

/// Replace the marker of a single checkbox line, keeping every other byte.
fn rewrite_marker(line: &str, status: CheckboxStatus) -> String {
    match line.find('[') {
        Some(open) if line[open + 1..].starts_with(&[' ', 'x', '~'][..]) => {
            let mut out = String::with_capacity(line.len());
            out.push_str(&line[..=open]);
            out.push(status.marker());
            out.push_str(&line[open + 2..]);
            out
        }
        _ => line.to_string(),
    }
}

/// Apply `update` to each item line; `update` gets `(item_index, title,
/// current status)` and returns the new status, if any.
fn rewrite_items<F>(text: &str, mut update: F) -> String
where
    F: FnMut(usize, &str, CheckboxStatus) -> Option<CheckboxStatus>,
{
    let mut out = String::with_capacity(text.len());
    let mut index = 0;
    let mut first = true;

    for raw in text.split('\n') {
        if !first {
            out.push('\n');
        }
        first = false;

        let (line, cr) = match raw.strip_suffix('\r') {
            Some(l) => (l, "\r"),
            None => (raw, ""),
        };

        let parsed = checkbox_re().captures(line).and_then(|caps| {
            let status = caps
                .get(2)
                .and_then(|m| m.as_str().chars().next())
                .and_then(CheckboxStatus::from_marker)?;
            let (title, _) = split_title(caps.get(3).map_or("", |m| m.as_str()))?;
            Some((status, title))
        });

        match parsed {
            Some((status, title)) => {
                match update(index, &title, status) {
                    Some(new_status) if new_status != status => {
                        out.push_str(&rewrite_marker(line, new_status));
                    }
                    _ => out.push_str(line),
                }
                index += 1;
            }
            None => out.push_str(line),
        }
        out.push_str(cr);
    }

    out
}

/// Set the status of the first item whose title matches exactly.
///
/// # Example
///
/// ```
/// use taskboard::plan::{parse_checkboxes, set_item_status, CheckboxStatus};
///
/// let plan = "- [ ] **Build**\n- [ ] **Test**\n";
/// let updated = set_item_status(plan, "Test", CheckboxStatus::Complete).unwrap();
/// assert_eq!(updated, "- [ ] **Build**\n- [x] **Test**\n");
/// assert_eq!(parse_checkboxes(&updated).items[1].status, CheckboxStatus::Complete);
/// ```
pub fn set_item_status(text: &str, title: &str, status: CheckboxStatus) -> Result<String> {
    let mut found = false;
    let mut total = 0;
    let out = rewrite_items(text, |_, item_title, _| {
        total += 1;
        if !found && item_title == title {
            found = true;
            Some(status)
        } else {
            None
        }
    });
    if found {
        Ok(out)
    } else {
        Err(TaskboardError::StepNotFound {
            step: title.to_string(),
            total,
        })
    }
}

/// Apply several title-keyed status changes in one pass.
///
/// Like [`set_item_status`], each title rewrites only its first matching
/// item. Titles not present in the plan are ignored.
#[must_use]
pub fn set_statuses(text: &str, updates: &HashMap<String, CheckboxStatus>) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    rewrite_items(text, |_, title, _| {
        let status = updates.get(title).copied()?;
        seen.insert(title.to_string()).then_some(status)
    })
}

/// Set the status of the item at a 0-based index.
pub fn set_status_at(text: &str, index: usize, status: CheckboxStatus) -> Result<String> {
    let mut total = 0;
    let out = rewrite_items(text, |i, _, _| {
        total += 1;
        (i == index).then_some(status)
    });
    if index < total {
        Ok(out)
    } else {
        Err(TaskboardError::StepNotFound {
            step: (index + 1).to_string(),
            total,
        })
    }
}

/// Mark every non-complete item complete; returns the rewritten text and the
/// titles that changed, in document order.
#[must_use]
pub fn complete_all(text: &str) -> (String, Vec<String>) {
    let mut changed = Vec::new();
    let out = rewrite_items(text, |_, title, status| {
        if status.is_complete() {
            None
        } else {
            changed.push(title.to_string());
            Some(CheckboxStatus::Complete)
        }
    });
    (out, changed)
}
