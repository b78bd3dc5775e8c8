mod common;

use std::sync::Arc;

use battle_client_core::board::{Board, CellEdit, Digit, Position};
use battle_client_core::config::SyncConfig;
use battle_client_core::game::{ApplyOutcome, EditOrigin, GameEvent, GameHandle, GamePhase};
use battle_client_core::sync::{
    BattleNode, Dispatcher, EditResult, PollTarget, PollingReader, Reconciler,
};
use common::*;

/// One participant's view: its own game, reconciler, dispatcher and poller
/// against the shared node.
struct Participant {
    game: GameHandle,
    reconciler: Arc<Reconciler>,
    dispatcher: Dispatcher,
    poller: PollingReader,
}

impl Participant {
    fn join(node: &Arc<FakeNode>, principal: &str, initial: Board, reference: Option<Board>) -> Self {
        let session = session_for(Some(principal));
        let game = GameHandle::new();
        game.start(initial, reference).unwrap();
        let battle = BattleNode::new(node.clone(), session.call_context());
        let reconciler = Arc::new(Reconciler::new(game.clone(), &session));
        let dispatcher = Dispatcher::new(battle.clone(), game.clone(), session.identity.clone());
        let poller = PollingReader::new(battle, Arc::clone(&reconciler), &SyncConfig::default());
        Self {
            game,
            reconciler,
            dispatcher,
            poller,
        }
    }

    fn value(&self, index: u32) -> Option<u8> {
        self.game.value_at(pos(index)).map(Digit::get)
    }

    fn history(&self) -> usize {
        self.game.read(|state| state.board().history_len())
    }

    async fn poll_logs(&self) {
        self.poller.tick(PollTarget::SolutionLog).await.unwrap();
        self.poller.tick(PollTarget::RemovedLog).await.unwrap();
    }
}

fn digit(value: u32) -> Option<Digit> {
    Some(Digit::new(value).unwrap())
}

/// `initial = [4, _, 5, ...]`.
fn small_board() -> Board {
    Board::from_givens(&[(0, 4), (2, 5)]).unwrap()
}

#[test]
fn repeated_edit_changes_the_board_once() {
    let game = GameHandle::new();
    game.start(small_board(), None).unwrap();
    let edit = CellEdit::new(pos(1), digit(6), "p", "p");
    assert_eq!(game.apply(&edit, EditOrigin::SolutionLog), Ok(ApplyOutcome::Written));
    assert_eq!(game.apply(&edit, EditOrigin::EventStream), Ok(ApplyOutcome::SkippedEqual));
    assert_eq!(game.read(|state| state.board().history_len()), 1);
}

#[test]
fn givens_never_change_from_any_origin() {
    let game = GameHandle::new();
    game.start(puzzle(), None).unwrap();
    let initial = puzzle();
    let origins = [
        EditOrigin::Local,
        EditOrigin::EventStream,
        EditOrigin::SolutionLog,
        EditOrigin::RemovedLog,
    ];
    for position in Position::all().filter(|p| initial.get(*p).is_some()) {
        for origin in origins {
            for value in [None, digit(1), digit(9)] {
                let edit = CellEdit::new(position, value, "p", "p");
                assert_eq!(game.apply(&edit, origin), Ok(ApplyOutcome::SkippedGiven));
            }
        }
    }
    assert_eq!(game.current(), initial);
    assert_eq!(game.read(|state| state.board().history_len()), 0);
}

#[test_timeout::tokio_timeout_test]
async fn one_suffix_equals_three_polls() {
    let entries = [(1, 6, "a"), (3, 2, "b"), (1, 9, "a")];

    let batched_node = FakeNode::new();
    let batched = Participant::join(&batched_node, "me", small_board(), None);
    for (position, value, editor) in entries {
        batched_node.remote_set(position, value, editor);
    }
    batched.poll_logs().await;

    let stepped_node = FakeNode::new();
    let stepped = Participant::join(&stepped_node, "me", small_board(), None);
    for (position, value, editor) in entries {
        stepped_node.remote_set(position, value, editor);
        stepped.poll_logs().await;
    }

    assert_eq!(batched.game.current(), stepped.game.current());
    assert_eq!(batched.value(1), Some(9));
    assert_eq!(batched.reconciler.cursors(), stepped.reconciler.cursors());
    assert_eq!(batched.reconciler.cursors().set_len, 3);

    // Replaying an unchanged log is a no-op.
    let before = batched.history();
    batched.poll_logs().await;
    assert_eq!(batched.history(), before);
}

#[test_timeout::tokio_timeout_test]
async fn own_events_are_not_reapplied_after_local_write() {
    let node = FakeNode::new();
    let me = Participant::join(&node, "me", small_board(), None);
    me.dispatcher.user_edit(pos(1), digit(6)).await.unwrap();
    assert_eq!(me.history(), 1);

    // Local undo, then our own event arrives late: it must not redo the write.
    me.game.undo().unwrap();
    let report = me.reconciler.handle_event(&cell_event(&[(1, 6, "me")])).unwrap();
    assert_eq!(report.suppressed, 1);
    assert_eq!(me.value(1), None);
    assert_eq!(me.history(), 0);
}

#[test_timeout::tokio_timeout_test]
async fn local_write_then_poll_confirmation_is_absorbed() {
    let node = FakeNode::new();
    let me = Participant::join(&node, "me", small_board(), None);

    let result = me.dispatcher.user_edit(pos(1), digit(6)).await.unwrap();
    assert_eq!(result, EditResult::Written(ApplyOutcome::Written));
    assert_eq!(me.value(1), Some(6));
    assert_eq!(me.history(), 1);

    // The poll sees (1, 6, me) in the log suffix.
    me.poll_logs().await;
    assert_eq!(me.value(1), Some(6));
    assert_eq!(me.history(), 1);
    assert_eq!(me.reconciler.cursors().set_len, 1);
    assert_eq!(node.write_calls(), 1);
}

#[test_timeout::tokio_timeout_test]
async fn peer_write_lands_once_via_event_and_poll() {
    let node = FakeNode::new();
    let alice = Participant::join(&node, "alice", small_board(), None);
    let bob = Participant::join(&node, "bob", small_board(), None);
    let mut bob_events = bob.game.subscribe();

    alice.dispatcher.user_edit(pos(5), digit(3)).await.unwrap();

    bob.reconciler
        .handle_event(&cell_event(&[(5, 3, "alice")]))
        .unwrap();
    bob.poll_logs().await;
    bob.reconciler
        .handle_event(&cell_event(&[(5, 3, "alice")]))
        .unwrap();

    assert_eq!(bob.value(5), Some(3));
    assert_eq!(bob.history(), 1);
    let mut changes = 0;
    while let Ok(event) = bob_events.try_recv() {
        if matches!(event, GameEvent::CellChanged { .. }) {
            changes += 1;
        }
    }
    assert_eq!(changes, 1);
    assert_eq!(
        bob.game.read(|state| state.board().editor_of(pos(5)).map(str::to_string)),
        Some("alice".to_string())
    );
}

#[test_timeout::tokio_timeout_test]
async fn remove_then_reset_keeps_log_order() {
    let node = FakeNode::new();
    let me = Participant::join(&node, "me", small_board(), None);

    node.remote_set(10, 4, "peer");
    me.poll_logs().await;
    assert_eq!(me.value(10), Some(4));

    node.remote_remove(10, "peer");
    me.poll_logs().await;
    assert_eq!(me.value(10), None);

    node.remote_set(10, 7, "peer");
    me.poll_logs().await;
    assert_eq!(me.value(10), Some(7));

    // The same history over the event stream.
    let watcher = Participant::join(&node, "watcher", small_board(), None);
    watcher
        .reconciler
        .handle_event(&cell_event(&[(10, 4, "peer"), (10, 0, "peer"), (10, 7, "peer")]))
        .unwrap();
    assert_eq!(watcher.value(10), Some(7));

    // Applying the set before the removal ends empty, which is how an
    // ordering mistake shows up.
    let misordered = Participant::join(&node, "late", small_board(), None);
    misordered
        .reconciler
        .handle_event(&cell_event(&[(10, 7, "peer"), (10, 0, "peer")]))
        .unwrap();
    assert_ne!(misordered.value(10), Some(7));
}

#[test_timeout::tokio_timeout_test]
async fn solved_fires_once_whatever_the_channel() {
    let cells = missing_cells();
    for finisher in [EditOrigin::Local, EditOrigin::EventStream, EditOrigin::SolutionLog] {
        let node = FakeNode::new();
        let me = Participant::join(&node, "me", puzzle(), Some(solution()));
        let mut events = me.game.subscribe();
        let (last, rest) = cells.split_last().unwrap();
        for (position, value) in rest {
            node.remote_set(*position, *value, "peer");
        }
        me.poll_logs().await;
        assert_eq!(me.game.phase(), GamePhase::InProgress);

        let (position, value) = *last;
        match finisher {
            EditOrigin::Local => {
                me.dispatcher.user_edit(pos(position), digit(value)).await.unwrap();
            }
            EditOrigin::EventStream => {
                me.reconciler
                    .handle_event(&cell_event(&[(position, value, "peer")]))
                    .unwrap();
                node.remote_set(position, value, "peer");
            }
            _ => {
                node.remote_set(position, value, "peer");
            }
        }
        // Every channel eventually delivers the final edit too.
        me.poll_logs().await;
        me.reconciler
            .handle_event(&cell_event(&[(position, value, "peer")]))
            .unwrap();

        assert_eq!(me.game.phase(), GamePhase::Solved, "finisher {finisher:?}");
        let mut solved = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let GameEvent::Solved { origin } = event {
                solved.push(origin);
            }
        }
        assert_eq!(solved, vec![finisher]);
    }
}
