//! Flatteners turning a scope's blocks into plain prompt text.
//!
//! The public day flattener is the privacy boundary for aggregate
//! indexing: journal content never enters it. All flatteners return
//! `None` when the blocks hold nothing substantive, so callers can skip
//! embedding or prompting on empty scopes.

use serde_json::{Map, Value};

use crate::blocks::{Block, BlockKind};

/// Lenient view of the habits `data` map. Fields arrive as strings or
/// numbers depending on which form version wrote them.
struct HabitsView<'a>(&'a Map<String, Value>);

impl<'a> HabitsView<'a> {
    fn scalar(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Habits data and task list for one day. Journal content is excluded;
/// this text feeds the public day-context document.
pub fn flatten_day_public(blocks: &[Block]) -> Option<String> {
    let mut output = String::new();

    if let Some(habits) = blocks.iter().find(|b| b.kind == BlockKind::DailyHabits) {
        let view = HabitsView(&habits.data);
        let mut lines = Vec::new();
        if let Some(sleep) = view.scalar("sleepLength") {
            lines.push(format!("- Sleep: {sleep} h"));
        }
        if let Some(prog) = view.scalar("prog") {
            lines.push(format!("- Productivity: {prog}/10"));
        }
        if let Some(sport) = view.scalar("sport") {
            lines.push(format!("- Sport: {sport}"));
        }
        if let Some(med) = view.scalar("med") {
            lines.push(format!("- Meditation: {med} min"));
        }
        if !lines.is_empty() {
            output.push_str("[DAILY DATA]\n");
            output.push_str(&lines.join("\n"));
            output.push_str("\n\n");
        }
    }

    if let Some(todo) = blocks.iter().find(|b| b.kind == BlockKind::DailyTodo) {
        if !todo.items.is_empty() {
            output.push_str("[TASKS]\n");
            for item in &todo.items {
                let mark = if item.is_done() { "[x]" } else { "[ ]" };
                output.push_str(&format!("- {mark} {}\n", item.label()));
            }
            output.push('\n');
        }
    }

    nonempty(output)
}

/// Public flatten plus the journal text. Only summarization uses this;
/// it never feeds an aggregate document.
pub fn flatten_day_private(blocks: &[Block]) -> Option<String> {
    let mut output = flatten_day_public(blocks).unwrap_or_default();

    if let Some(journal) = blocks.iter().find(|b| b.kind == BlockKind::DailyJournal) {
        let mut lines = Vec::new();
        if let Some(content) = &journal.content {
            if !content.trim().is_empty() {
                lines.push(content.clone());
            }
        }
        for item in &journal.items {
            if !item.text.trim().is_empty() {
                lines.push(item.text.clone());
            }
        }
        if !lines.is_empty() {
            output.push_str("[JOURNAL]\n");
            output.push_str(&lines.join("\n"));
            output.push('\n');
        }
    }

    nonempty(output)
}

/// Weekly goals plus the week's daily summaries, ordered by day.
/// `include_private` admits private daily summaries and the weekly
/// journal.
pub fn flatten_week(blocks: &[Block], include_private: bool) -> Option<String> {
    let mut output = String::new();

    if let Some(todo) = blocks.iter().find(|b| b.kind == BlockKind::WeeklyTodo) {
        if !todo.items.is_empty() {
            output.push_str("[WEEKLY GOALS]\n");
            for item in &todo.items {
                let mark = if item.is_done() { "[x]" } else { "[ ]" };
                output.push_str(&format!("- {mark} {}\n", item.label()));
            }
            output.push('\n');
        }
    }

    let mut summaries: Vec<&Block> = blocks
        .iter()
        .filter(|b| {
            b.kind == BlockKind::DailySummaryPublic
                || (include_private && b.kind == BlockKind::DailySummaryPrivate)
        })
        .filter(|b| b.content.as_deref().is_some_and(|c| !c.trim().is_empty()))
        .collect();
    summaries.sort_by(|a, b| a.scope.id.cmp(&b.scope.id));

    if summaries.is_empty() {
        output.push_str("(No daily summaries available for this week.)\n");
    } else {
        output.push_str("[DAILY SUMMARIES]\n");
        for summary in summaries {
            let label = match summary.kind {
                BlockKind::DailySummaryPrivate => "private",
                _ => "public",
            };
            output.push_str(&format!(
                "### {} ({label}):\n{}\n\n",
                summary.scope.id,
                summary.content.as_deref().unwrap_or_default()
            ));
        }
    }

    if include_private {
        if let Some(journal) = blocks.iter().find(|b| b.kind == BlockKind::WeeklyJournal) {
            if let Some(content) = journal.content.as_deref().filter(|c| !c.trim().is_empty()) {
                output.push_str(&format!("[WEEKLY JOURNAL]\n{content}\n"));
            }
        }
    }

    nonempty(output)
}

/// The month's weekly summaries, ordered by week id.
pub fn flatten_month(blocks: &[Block]) -> Option<String> {
    let mut summaries: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::WeeklySummary)
        .filter(|b| b.content.as_deref().is_some_and(|c| !c.trim().is_empty()))
        .collect();
    summaries.sort_by(|a, b| a.scope.id.cmp(&b.scope.id));

    if summaries.is_empty() {
        return None;
    }

    let mut output = String::from("[WEEKLY SUMMARIES]\n");
    for summary in summaries {
        output.push_str(&format!(
            "### {}:\n{}\n\n",
            summary.scope.id,
            summary.content.as_deref().unwrap_or_default()
        ));
    }
    Some(output)
}

fn nonempty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
