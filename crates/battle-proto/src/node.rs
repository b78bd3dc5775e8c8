use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::EMPTY_CELL;

/// Event kinds the battle application emits when a cell is cleared.
pub const REMOVAL_EVENT_KINDS: &[&str] = &["CellRemoved", "ValueRemoved"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCellArgs {
    pub position: u8,
    pub value: u8,
    pub editor_address: String,
    pub editor_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCellArgs {
    pub position: u8,
    pub editor_address: String,
    pub editor_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteArgs {
    pub public: bool,
    pub caller: String,
}

/// One slot of an append-only node log. An entry without the expected shape
/// is kept raw, so the rest of the log still decodes and the slot still
/// counts towards the log length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry<T> {
    Entry(T),
    Malformed { raw: Value, reason: String },
}

impl<T> From<T> for LogEntry<T> {
    fn from(entry: T) -> Self {
        LogEntry::Entry(entry)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for LogEntry<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let parsed = T::deserialize(&raw);
        Ok(match parsed {
            Ok(entry) => LogEntry::Entry(entry),
            Err(err) => LogEntry::Malformed {
                reason: err.to_string(),
                raw,
            },
        })
    }
}

/// Output of `get_current_solution`.
pub type SolutionLog = Vec<LogEntry<SolutionEntry>>;
/// Output of `get_removed_cells`.
pub type RemovedLog = Vec<LogEntry<RemovedEntry>>;

/// One accepted `set_cell`, as returned by `get_current_solution`.
///
/// The node encodes entries as `[position, value, editor_address, editor_name]`.
/// Position and value are kept wide so out-of-range entries reach the
/// reconciler intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32, String, String)", into = "(u32, u32, String, String)")]
pub struct SolutionEntry {
    pub position: u32,
    pub value: u32,
    pub editor_address: String,
    pub editor_name: String,
}

impl From<(u32, u32, String, String)> for SolutionEntry {
    fn from((position, value, editor_address, editor_name): (u32, u32, String, String)) -> Self {
        Self {
            position,
            value,
            editor_address,
            editor_name,
        }
    }
}

impl From<SolutionEntry> for (u32, u32, String, String) {
    fn from(entry: SolutionEntry) -> Self {
        (
            entry.position,
            entry.value,
            entry.editor_address,
            entry.editor_name,
        )
    }
}

/// One accepted `remove_cell`, encoded as `[position, editor_address, editor_name]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, String, String)", into = "(u32, String, String)")]
pub struct RemovedEntry {
    pub position: u32,
    pub editor_address: String,
    pub editor_name: String,
}

impl From<(u32, String, String)> for RemovedEntry {
    fn from((position, editor_address, editor_name): (u32, String, String)) -> Self {
        Self {
            position,
            editor_address,
            editor_name,
        }
    }
}

impl From<RemovedEntry> for (u32, String, String) {
    fn from(entry: RemovedEntry) -> Self {
        (entry.position, entry.editor_address, entry.editor_name)
    }
}

/// Snapshot of proof-visibility votes, encoded as `[[public...], [private...]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Vec<String>, Vec<String>)", into = "(Vec<String>, Vec<String>)")]
pub struct VoteTally {
    pub want_public: BTreeSet<String>,
    pub want_private: BTreeSet<String>,
}

impl From<(Vec<String>, Vec<String>)> for VoteTally {
    fn from((public, private): (Vec<String>, Vec<String>)) -> Self {
        Self {
            want_public: public.into_iter().collect(),
            want_private: private.into_iter().collect(),
        }
    }
}

impl From<VoteTally> for (Vec<String>, Vec<String>) {
    fn from(tally: VoteTally) -> Self {
        (
            tally.want_public.into_iter().collect(),
            tally.want_private.into_iter().collect(),
        )
    }
}

impl VoteTally {
    pub fn has_voted(&self, participant: &str) -> bool {
        self.want_public.contains(participant) || self.want_private.contains(participant)
    }

    pub fn voter_count(&self) -> usize {
        self.want_public.union(&self.want_private).count()
    }

    /// Agreed visibility once `player_count` distinct players have voted.
    /// `Some(true)` means publish the solution; public needs a strict majority
    /// of distinct voters. A voter listed on both sides counts as private.
    pub fn decision(&self, player_count: usize) -> Option<bool> {
        if player_count == 0 || self.voter_count() < player_count {
            return None;
        }
        let public_only = self.want_public.difference(&self.want_private).count();
        Some(public_only > self.want_private.len())
    }
}

/// JSON carried inside an execution event's byte payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
    pub editor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CellEventPayload {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// `envelope_kind` is the kind the node attached outside the payload, if any.
    pub fn is_removal(&self, envelope_kind: Option<&str>) -> bool {
        let kind_says_removal = self
            .kind
            .as_deref()
            .into_iter()
            .chain(envelope_kind)
            .any(|kind| REMOVAL_EVENT_KINDS.contains(&kind));
        kind_says_removal || self.value.unwrap_or(EMPTY_CELL) == EMPTY_CELL
    }
}
