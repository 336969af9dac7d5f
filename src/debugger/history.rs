use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use super::snapshot::{Snapshot, VariableView};
use crate::error::Result;

/// What a step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Executed,
    BreakpointHit,
    Errored,
    Done,
}

impl StepStatus {
    /// Whether the session ends with this step.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Errored | StepStatus::Done)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Executed => "executed",
            StepStatus::BreakpointHit => "breakpointHit",
            StepStatus::Errored => "errored",
            StepStatus::Done => "done",
        })
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub status: StepStatus,
    /// Text printed while the line executed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Fault text for an `errored` step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryEntry {
    pub fn line_index(&self) -> usize {
        self.snapshot.line_index
    }
}

/// Ordered, append-only record of every step of a session.
///
/// Entries cannot be modified once appended; the only mutation is
/// [`HistoryLog::append`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) -> &HistoryEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Iterate the entries in order. The iterator is `Clone`, so it can be
    /// restarted from any point.
    pub fn entries(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// The sequence of variable states, in step order.
    pub fn replay(&self) -> impl Iterator<Item = &BTreeMap<String, VariableView>> + Clone {
        self.entries.iter().map(|entry| &entry.snapshot.variables)
    }

    /// Write one JSON record per line.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<()> {
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a log written by [`HistoryLog::write_jsonl`]. Blank lines are
    /// skipped.
    pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(Self { entries })
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
