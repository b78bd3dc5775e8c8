//! Folds remote deltas into the local game.
//!
//! Log pollers hand over the full log on every tick; only the suffix past the
//! per-log cursor is applied, in log order. Event stream payloads are applied
//! directly unless they were produced by this participant, whose writes the
//! dispatcher has already applied. Nothing is de-duplicated by edit identity:
//! a redundant delivery is absorbed because applying a value a cell already
//! holds is a no-op.

use std::sync::Arc;

use battle_proto::{CellEventPayload, LogEntry, RemovedEntry, SolutionEntry};
use node_client::{EventCallback, HandlerError, NodeEvent};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::board::{BoardError, Cell, CellEdit, Position, cell_from_wire};
use crate::game::{ApplyOutcome, EditOrigin, GameError, GameHandle, GamePhase};
use crate::session::SessionContext;

use super::SyncError;

/// Number of entries of each remote log already folded into the board.
/// Both only ever grow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogCursors {
    pub set_len: usize,
    pub removed_len: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries that changed the board.
    pub applied: usize,
    /// Entries the board already reflected, or that targeted a given cell.
    pub skipped: usize,
    /// Self-originated events ignored on the event path.
    pub suppressed: usize,
    /// Entries that could not be placed on the board.
    pub rejected: usize,
    /// Whether one of the entries completed the puzzle.
    pub solved: bool,
}

impl ReconcileReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Written => self.applied += 1,
            ApplyOutcome::Solved => {
                self.applied += 1;
                self.solved = true;
            }
            ApplyOutcome::SkippedGiven | ApplyOutcome::SkippedEqual => self.skipped += 1,
        }
    }
}

pub struct Reconciler {
    game: GameHandle,
    context_id: String,
    self_id: Option<String>,
    cursors: Mutex<LogCursors>,
}

impl Reconciler {
    pub fn new(game: GameHandle, session: &SessionContext) -> Self {
        Self {
            game,
            context_id: session.battle.context_id.clone(),
            self_id: session.self_id().map(str::to_string),
            cursors: Mutex::new(LogCursors::default()),
        }
    }

    pub fn cursors(&self) -> LogCursors {
        *self.cursors.lock()
    }

    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    /// Applies the entries of the current-solution log beyond the set cursor.
    pub fn apply_solution_log(
        &self,
        log: &[LogEntry<SolutionEntry>],
    ) -> Result<ReconcileReport, SyncError> {
        self.ensure_started()?;
        let mut cursors = self.cursors.lock();
        let Some(suffix) = suffix(log, cursors.set_len, "solution") else {
            return Ok(ReconcileReport::default());
        };
        let mut report = ReconcileReport::default();
        for entry in suffix {
            let edit = log_edit(entry, solution_edit);
            self.fold(edit, EditOrigin::SolutionLog, &mut report)?;
        }
        cursors.set_len = log.len();
        drop(cursors);
        log_report("solution", &report);
        Ok(report)
    }

    /// Applies the entries of the removed-cell log beyond the removed cursor.
    pub fn apply_removed_log(
        &self,
        log: &[LogEntry<RemovedEntry>],
    ) -> Result<ReconcileReport, SyncError> {
        self.ensure_started()?;
        let mut cursors = self.cursors.lock();
        let Some(suffix) = suffix(log, cursors.removed_len, "removed") else {
            return Ok(ReconcileReport::default());
        };
        let mut report = ReconcileReport::default();
        for entry in suffix {
            let edit = log_edit(entry, removed_edit);
            self.fold(edit, EditOrigin::RemovedLog, &mut report)?;
        }
        cursors.removed_len = log.len();
        drop(cursors);
        log_report("removed", &report);
        Ok(report)
    }

    /// Applies the cell edits carried by an execution event. Malformed
    /// payloads are skipped; the first one is reported once the whole event
    /// has been processed. Events that name no context are taken to belong to
    /// the subscribed one.
    pub fn handle_event(&self, event: &NodeEvent) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();
        let context_id = event.context_id();
        if !context_id.is_empty() && context_id != self.context_id {
            trace!(target: "battle::reconcile", context = event.context_id(), "event for another context");
            return Ok(report);
        }
        let payloads = match event {
            NodeEvent::StateMutation { new_root, .. } => {
                debug!(target: "battle::reconcile", %new_root, "state root changed");
                return Ok(report);
            }
            NodeEvent::ExecutionEvent { events, .. } => events,
        };
        self.ensure_started()?;

        let mut first_error = None;
        for payload in payloads {
            let decoded = match CellEventPayload::from_bytes(&payload.data) {
                Ok(decoded) => decoded,
                Err(err) => {
                    report.rejected += 1;
                    warn!(target: "battle::reconcile", error = %err, "undecodable execution event");
                    first_error.get_or_insert(SyncError::StaleRead(err.to_string()));
                    continue;
                }
            };
            if self.self_id.as_deref() == Some(decoded.editor.as_str()) {
                report.suppressed += 1;
                trace!(
                    target: "battle::reconcile",
                    position = decoded.position,
                    "own event suppressed"
                );
                continue;
            }
            let edit = event_edit(&decoded, payload.kind.as_deref()).map_err(stale);
            if let Err(err) = self.fold(edit, EditOrigin::EventStream, &mut report) {
                first_error.get_or_insert(err);
            }
        }
        log_report("event", &report);
        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Callback for [`node_client::EventStreamClient::add_callback`].
    pub fn event_callback(self: &Arc<Self>) -> EventCallback {
        let reconciler = Arc::clone(self);
        Arc::new(move |event: &NodeEvent| -> Result<(), HandlerError> {
            reconciler
                .handle_event(event)
                .map(|_| ())
                .map_err(|err| Box::new(err) as HandlerError)
        })
    }

    fn ensure_started(&self) -> Result<(), SyncError> {
        if self.game.phase() == GamePhase::NotStarted {
            return Err(GameError::NotStarted.into());
        }
        Ok(())
    }

    /// Applies one decoded entry. A malformed entry is counted and logged but
    /// does not stop the batch; a game error does.
    fn fold(
        &self,
        edit: Result<CellEdit, SyncError>,
        origin: EditOrigin,
        report: &mut ReconcileReport,
    ) -> Result<(), SyncError> {
        match edit {
            Ok(edit) => {
                let outcome = self.game.apply(&edit, origin)?;
                report.record(outcome);
                Ok(())
            }
            Err(err) => {
                report.rejected += 1;
                warn!(target: "battle::reconcile", ?origin, error = %err, "skipping unplaceable entry");
                if origin == EditOrigin::EventStream {
                    return Err(err);
                }
                Ok(())
            }
        }
    }
}

/// Entries beyond `seen`, or `None` when the fetched log is shorter than what
/// was already folded.
fn suffix<'a, T>(log: &'a [T], seen: usize, which: &'static str) -> Option<&'a [T]> {
    if log.len() < seen {
        warn!(
            target: "battle::reconcile",
            log = which,
            fetched = log.len(),
            seen,
            "remote log shorter than cursor; ignoring"
        );
        return None;
    }
    Some(&log[seen..])
}

fn stale(err: BoardError) -> SyncError {
    SyncError::StaleRead(err.to_string())
}

fn log_edit<T>(
    entry: &LogEntry<T>,
    to_edit: impl FnOnce(&T) -> Result<CellEdit, BoardError>,
) -> Result<CellEdit, SyncError> {
    match entry {
        LogEntry::Entry(entry) => to_edit(entry).map_err(stale),
        LogEntry::Malformed { raw, reason } => Err(SyncError::StaleRead(format!(
            "malformed log entry {raw}: {reason}"
        ))),
    }
}

fn removed_edit(entry: &RemovedEntry) -> Result<CellEdit, BoardError> {
    let position = Position::new(entry.position)?;
    Ok(CellEdit::new(
        position,
        None,
        &entry.editor_address,
        &entry.editor_name,
    ))
}

fn solution_edit(entry: &SolutionEntry) -> Result<CellEdit, BoardError> {
    let position = Position::new(entry.position)?;
    let value = cell_from_wire(entry.value)?;
    Ok(CellEdit::new(
        position,
        value,
        &entry.editor_address,
        &entry.editor_name,
    ))
}

fn event_edit(payload: &CellEventPayload, envelope_kind: Option<&str>) -> Result<CellEdit, BoardError> {
    let position = Position::new(payload.position)?;
    let value: Cell = if payload.is_removal(envelope_kind) {
        None
    } else {
        cell_from_wire(payload.value.unwrap_or_default())?
    };
    let name = payload.name.as_deref().unwrap_or(&payload.editor);
    Ok(CellEdit::new(position, value, &payload.editor, name))
}

fn log_report(source: &'static str, report: &ReconcileReport) {
    if report.applied > 0 || report.rejected > 0 {
        debug!(
            target: "battle::reconcile",
            source,
            applied = report.applied,
            skipped = report.skipped,
            suppressed = report.suppressed,
            rejected = report.rejected,
            solved = report.solved,
            "reconciled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::board::tests::PUZZLE;
    use crate::session::BattleContext;
    use node_client::ExecutionEventPayload;
    use serde_json::json;

    fn session(principal: &str) -> SessionContext {
        SessionContext::new(
            BattleContext {
                battle_id: 1,
                context_id: "ctx".into(),
                context_identity: "exec".into(),
                creator_identity: "creator".into(),
            },
            Some(crate::session::PlayerIdentity::new(
                principal,
                crate::wallet::WalletType::default(),
            )),
        )
    }

    fn started() -> Reconciler {
        let game = GameHandle::new();
        game.start(PUZZLE.parse().unwrap(), None).unwrap();
        Reconciler::new(game, &session("me"))
    }

    fn set(position: u32, value: u32, editor: &str) -> LogEntry<SolutionEntry> {
        SolutionEntry {
            position,
            value,
            editor_address: editor.into(),
            editor_name: editor.into(),
        }
        .into()
    }

    fn removed(position: u32, editor: &str) -> LogEntry<RemovedEntry> {
        RemovedEntry {
            position,
            editor_address: editor.into(),
            editor_name: editor.into(),
        }
        .into()
    }

    fn cell_event(payloads: &[serde_json::Value]) -> NodeEvent {
        NodeEvent::ExecutionEvent {
            context_id: "ctx".into(),
            events: payloads
                .iter()
                .map(|payload| ExecutionEventPayload {
                    kind: None,
                    data: serde_json::to_vec(payload).unwrap(),
                })
                .collect(),
        }
    }

    fn value(reconciler: &Reconciler, index: u32) -> u8 {
        crate::board::cell_to_wire(reconciler.game().value_at(Position::new(index).unwrap()))
    }

    #[test]
    fn only_the_suffix_is_applied() {
        let reconciler = started();
        let first = vec![set(2, 4, "a"), set(3, 6, "b")];
        let report = reconciler.apply_solution_log(&first).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(reconciler.cursors().set_len, 2);

        // An undo locally must not be re-driven by entries already folded.
        reconciler.game().undo().unwrap();
        let mut grown = first.clone();
        grown.push(set(5, 8, "a"));
        let report = reconciler.apply_solution_log(&grown).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(value(&reconciler, 3), 0);
        assert_eq!(value(&reconciler, 5), 8);
        assert_eq!(reconciler.cursors().set_len, 3);
    }

    #[test]
    fn shorter_log_leaves_cursor_alone() {
        let reconciler = started();
        reconciler
            .apply_solution_log(&[set(2, 4, "a"), set(3, 6, "a")])
            .unwrap();
        let report = reconciler.apply_solution_log(&[set(2, 4, "a")]).unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(reconciler.cursors().set_len, 2);
    }

    #[test]
    fn malformed_entries_are_skipped_but_consumed() {
        let reconciler = started();
        let log = vec![set(99, 4, "a"), set(2, 12, "a"), set(3, 6, "a")];
        let report = reconciler.apply_solution_log(&log).unwrap();
        assert_eq!(report.rejected, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(reconciler.cursors().set_len, 3);
    }

    #[test]
    fn structurally_malformed_entries_do_not_stall_the_log() {
        let reconciler = started();
        let log: battle_proto::SolutionLog =
            serde_json::from_value(json!([[2, 4, "a", "A"], [-1, 4, "a", "A"], [2, "x"]])).unwrap();
        let report = reconciler.apply_solution_log(&log).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, 2);
        assert_eq!(reconciler.cursors().set_len, 3);

        let grown: battle_proto::SolutionLog = serde_json::from_value(json!([
            [2, 4, "a", "A"], [-1, 4, "a", "A"], [2, "x"], [3, 6, "a", "A"]
        ]))
        .unwrap();
        let report = reconciler.apply_solution_log(&grown).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(value(&reconciler, 2), 4);
        assert_eq!(value(&reconciler, 3), 6);

        let removed: battle_proto::RemovedLog =
            serde_json::from_value(json!([[2, 9], [2, "b", "B"]])).unwrap();
        let report = reconciler.apply_removed_log(&removed).unwrap();
        assert_eq!((report.rejected, report.applied), (1, 1));
        assert_eq!(value(&reconciler, 2), 0);
        assert_eq!(reconciler.cursors().removed_len, 2);
    }

    #[test]
    fn logs_are_refused_before_the_game_starts() {
        let reconciler = Reconciler::new(GameHandle::new(), &session("me"));
        let err = reconciler
            .apply_removed_log(&[removed(2, "a")])
            .unwrap_err();
        assert!(matches!(err, SyncError::Game(GameError::NotStarted)));
        assert_eq!(reconciler.cursors(), LogCursors::default());
    }

    #[test]
    fn removal_log_clears_cells() {
        let reconciler = started();
        reconciler.apply_solution_log(&[set(2, 4, "a")]).unwrap();
        let report = reconciler
            .apply_removed_log(&[removed(2, "b"), removed(0, "b")])
            .unwrap();
        assert_eq!(report.applied, 1);
        // Position 0 is a given.
        assert_eq!(report.skipped, 1);
        assert_eq!(value(&reconciler, 2), 0);
        assert_eq!(value(&reconciler, 0), 5);
        assert_eq!(reconciler.cursors().removed_len, 2);
    }

    #[test]
    fn own_events_are_suppressed() {
        let reconciler = started();
        let event = cell_event(&[
            json!({"position": 2, "value": 4, "editor": "me"}),
            json!({"position": 3, "value": 6, "editor": "peer", "name": "Peer"}),
        ]);
        let report = reconciler.handle_event(&event).unwrap();
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(value(&reconciler, 2), 0);
        assert_eq!(value(&reconciler, 3), 6);
    }

    #[test]
    fn removal_events_clear_cells() {
        let reconciler = started();
        reconciler.apply_solution_log(&[set(2, 4, "peer")]).unwrap();
        let event = cell_event(&[json!({"kind": "CellRemoved", "position": 2, "value": 4, "editor": "peer"})]);
        reconciler.handle_event(&event).unwrap();
        assert_eq!(value(&reconciler, 2), 0);

        reconciler.apply_solution_log(&[set(2, 4, "peer"), set(2, 7, "peer")]).unwrap();
        let event = cell_event(&[json!({"position": 2, "value": 0, "editor": "peer"})]);
        reconciler.handle_event(&event).unwrap();
        assert_eq!(value(&reconciler, 2), 0);
    }

    #[test]
    fn bad_payload_does_not_block_the_rest_of_the_event() {
        let reconciler = started();
        let mut event = cell_event(&[json!({"position": 3, "value": 6, "editor": "peer"})]);
        if let NodeEvent::ExecutionEvent { events, .. } = &mut event {
            events.insert(
                0,
                ExecutionEventPayload {
                    kind: None,
                    data: b"not json".to_vec(),
                },
            );
        }
        let err = reconciler.handle_event(&event).unwrap_err();
        assert!(matches!(err, SyncError::StaleRead(_)));
        assert_eq!(value(&reconciler, 3), 6);
    }

    #[test]
    fn events_for_other_contexts_and_root_changes_are_ignored() {
        let reconciler = started();
        let foreign = NodeEvent::ExecutionEvent {
            context_id: "elsewhere".into(),
            events: vec![ExecutionEventPayload {
                kind: None,
                data: br#"{"position": 3, "value": 6, "editor": "peer"}"#.to_vec(),
            }],
        };
        assert_eq!(reconciler.handle_event(&foreign).unwrap(), ReconcileReport::default());
        let root = NodeEvent::StateMutation {
            context_id: "ctx".into(),
            new_root: "abc".into(),
        };
        assert_eq!(reconciler.handle_event(&root).unwrap(), ReconcileReport::default());
        assert_eq!(reconciler.game().current(), PUZZLE.parse::<Board>().unwrap());
    }

    #[test]
    fn events_without_a_context_belong_to_the_subscription() {
        let reconciler = started();
        let event = NodeEvent::ExecutionEvent {
            context_id: String::new(),
            events: vec![
                ExecutionEventPayload {
                    kind: None,
                    data: br#"{"position":2,"value":4,"editor":"peer"}"#.to_vec(),
                },
                ExecutionEventPayload {
                    kind: None,
                    data: br#"{"position":3,"value":6,"editor":"me"}"#.to_vec(),
                },
            ],
        };
        let report = reconciler.handle_event(&event).unwrap();
        assert_eq!((report.applied, report.suppressed), (1, 1));
        assert_eq!(value(&reconciler, 2), 4);
        assert_eq!(value(&reconciler, 3), 0);
    }
}
