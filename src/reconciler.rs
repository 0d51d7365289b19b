//! Deterministic reconciliation of per-frame bundles.
//!
//! [`Reconciler`] owns the history window and turns bundles, arriving in any
//! order from any engine, into the same sequence of game states on every
//! peer. It is synchronous and single-owner; the [`Updater`](crate::Updater)
//! task drives it and answers queries against it.
//!
//! ## Algorithm
//!
//! Accepting a bundle extends the window's known frames up to the bundle's
//! frame (copying membership and game forward), merges the contributions into
//! the slot, and marks the slot dirty. Then:
//!
//! 1. **Rethink**: every frame from the oldest dirty frame up to the newest
//!    known frame is re-derived from its predecessor. Membership changes are
//!    applied first, then game events in ascending engine order, then one
//!    `think()`. Only engines that were members in the predecessor frame have
//!    their events applied.
//! 2. **Advance**: while the frame after the window start has a contribution
//!    from every engine that was a member before it (and was not dropped in
//!    it), the window moves forward and the new start is published as a
//!    [`BootstrapFrame`].
//!
//! Because every peer re-derives from the same resolved predecessor with the
//! same ordered inputs, arrival order never affects resolved state.

use std::collections::btree_map::Entry;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::types::{
    AllEvents, BootstrapFrame, EngineEvent, EngineId, EngineParams, Event, EventBundle,
    FrameBundle, FrameData, Game, Snapshot, StateFrame,
};
use crate::window::HistoryWindow;
use crate::{Result, SyncError};

/// Outputs produced while handling one bundle.
pub struct Effects<G: Game> {
    /// Bundles to send to every peer.
    pub broadcast: Vec<FrameBundle<G::Event>>,
    /// Frames that became resolved, oldest first.
    pub resolved: Vec<BootstrapFrame<G>>,
}

impl<G: Game> Default for Effects<G> {
    fn default() -> Self {
        Self { broadcast: Vec::new(), resolved: Vec::new() }
    }
}

pub struct Reconciler<G: Game> {
    id: EngineId,
    window: HistoryWindow<FrameData<G>>,
    local_frame: StateFrame,
    global_frame: StateFrame,
    oldest_dirty: StateFrame,
    skip_to_frame: Option<StateFrame>,
}

impl<G: Game> Reconciler<G> {
    /// Start a fresh session at `frame` with `initial` as the resolved state.
    pub fn start(params: &EngineParams, frame: StateFrame, initial: FrameData<G>) -> Self {
        Self {
            id: params.id,
            window: HistoryWindow::new(params.window_capacity(), frame, initial),
            local_frame: frame,
            global_frame: frame,
            oldest_dirty: frame + 1,
            skip_to_frame: None,
        }
    }

    /// Join a running session from a peer's resolved frame.
    ///
    /// The frame after the bootstrap frame starts as a placeholder: it is
    /// never considered complete and is not simulated until a contribution
    /// lands in it. Local bundles before that frame are discarded.
    pub fn bootstrap(params: &EngineParams, boot: BootstrapFrame<G>) -> Self {
        let BootstrapFrame { frame, game, info } = boot;
        let resolved = FrameData { info, game, bundle: EventBundle::new(), placeholder: false };
        let mut window = HistoryWindow::new(params.window_capacity(), frame, resolved);
        if let Ok(slot) = window.get_mut(frame + 1) {
            slot.placeholder = true;
        }

        Self {
            id: params.id,
            window,
            local_frame: frame,
            global_frame: frame,
            oldest_dirty: frame + 1,
            skip_to_frame: Some(frame + 1),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Most recent resolved frame.
    pub fn start_frame(&self) -> StateFrame {
        self.window.start()
    }

    /// Newest frame this engine has produced.
    pub fn local_frame(&self) -> StateFrame {
        self.local_frame
    }

    /// Newest frame any bundle has referenced.
    pub fn global_frame(&self) -> StateFrame {
        self.global_frame
    }

    pub fn skip_to_frame(&self) -> Option<StateFrame> {
        self.skip_to_frame
    }

    /// Accept a bundle produced by this engine's bundler.
    pub fn handle_local(&mut self, bundle: FrameBundle<G::Event>) -> Result<Effects<G>> {
        let mut effects = Effects::default();

        if let Some(skip) = self.skip_to_frame {
            if bundle.frame < skip {
                trace!("Discarding local bundle for frame {} before {}", bundle.frame, skip);
                return Ok(effects);
            }
            for frame in skip..bundle.frame {
                let filler = FrameBundle::empty(frame, self.id);
                if self.ingest(filler.clone())? {
                    effects.broadcast.push(filler);
                }
            }
            debug!("Caught up with session at frame {}", bundle.frame);
            self.skip_to_frame = None;
        }

        self.local_frame = self.local_frame.max(bundle.frame);
        if self.ingest(bundle.clone())? {
            effects.broadcast.push(bundle);
        } else {
            trace!("Local bundle for resolved frame {} ignored", bundle.frame);
        }
        self.advance(&mut effects)?;
        Ok(effects)
    }

    /// Accept a bundle relayed from a peer.
    pub fn handle_remote(&mut self, bundle: FrameBundle<G::Event>) -> Result<Effects<G>> {
        let mut effects = Effects::default();
        if bundle.frame <= self.window.start() {
            trace!("Stale remote bundle for frame {} dropped", bundle.frame);
            return Ok(effects);
        }

        if let Some(skip) = self.skip_to_frame {
            let admits_us = bundle
                .bundle
                .values()
                .flat_map(|events| &events.engine)
                .any(|event| *event == EngineEvent::Joined(self.id));
            if admits_us && bundle.frame > skip {
                debug!("Admitted to session at frame {}", bundle.frame);
                self.skip_to_frame = Some(bundle.frame);
            }
        }

        self.ingest(bundle)?;
        self.advance(&mut effects)?;
        Ok(effects)
    }

    /// Merge a bundle into its slot. Returns false if the frame is already resolved.
    fn ingest(&mut self, bundle: FrameBundle<G::Event>) -> Result<bool> {
        let FrameBundle { frame, bundle } = bundle;
        if frame <= self.window.start() {
            return Ok(false);
        }
        if frame >= self.window.end() {
            return Err(SyncError::out_of_range(frame, self.window.start(), self.window.end()));
        }
        if frame > self.global_frame {
            self.extend_to(frame)?;
        }

        let slot = self.window.get_mut(frame)?;
        let mut merged = false;
        for (engine, events) in bundle {
            match slot.bundle.entry(engine) {
                Entry::Vacant(entry) => {
                    entry.insert(events);
                    merged = true;
                }
                Entry::Occupied(_) => {
                    trace!("Duplicate contribution from {} for frame {} ignored", engine, frame);
                }
            }
        }
        if merged {
            slot.placeholder = false;
            self.oldest_dirty = self.oldest_dirty.min(frame);
        }
        Ok(true)
    }

    /// Initialize every frame after `global_frame` up to `frame`.
    fn extend_to(&mut self, frame: StateFrame) -> Result<()> {
        for next in self.global_frame + 1..=frame {
            let prev = self.window.get(next - 1)?;
            let info = prev.info.clone();
            let game = Arc::clone(&prev.game);

            // Recycled slots hold stale data; a seeded placeholder flag survives.
            let slot = self.window.get_mut(next)?;
            slot.info = info;
            slot.game = game;
            slot.bundle.clear();
        }
        self.oldest_dirty = self.oldest_dirty.min(self.global_frame + 1);
        self.global_frame = frame;
        Ok(())
    }

    fn advance(&mut self, effects: &mut Effects<G>) -> Result<()> {
        self.rethink()?;

        while self.window.start() < self.global_frame && self.is_complete(self.window.start() + 1)? {
            self.window.advance();
            trace!("Frame {} resolved", self.window.start());
            effects.resolved.extend(self.latest_resolved());
        }
        Ok(())
    }

    fn rethink(&mut self) -> Result<()> {
        for frame in self.oldest_dirty..=self.global_frame {
            let prev = self.window.get(frame - 1)?;
            let members = prev.info.clone();
            let prev_game = Arc::clone(&prev.game);

            let slot = self.window.get_mut(frame)?;
            let admitted: Vec<&AllEvents<G::Event>> = slot
                .bundle
                .iter()
                .filter(|(id, _)| members.contains(**id))
                .map(|(_, events)| events)
                .collect();

            let mut info = members.clone();
            for event in admitted.iter().flat_map(|events| &events.engine) {
                event.apply(&mut info);
            }

            let game = if slot.placeholder {
                prev_game
            } else {
                let mut game = (*prev_game).clone();
                for event in admitted.iter().flat_map(|events| &events.game) {
                    event.apply(&mut game);
                }
                game.think();
                Arc::new(game)
            };

            slot.info = info;
            slot.game = game;
        }
        self.oldest_dirty = self.global_frame + 1;
        Ok(())
    }

    /// Every predecessor member still present in `frame` has contributed.
    fn is_complete(&self, frame: StateFrame) -> Result<bool> {
        let slot = self.window.get(frame)?;
        if slot.placeholder {
            return Ok(false);
        }
        let members = &self.window.get(frame - 1)?.info;
        Ok(members
            .iter()
            .filter(|id| slot.info.contains(*id))
            .all(|id| slot.bundle.contains_key(&id)))
    }

    /// The most recent resolved frame, ready to bootstrap a joiner.
    pub fn latest_resolved(&self) -> Option<BootstrapFrame<G>> {
        let frame = self.window.start();
        let slot = self.window.get(frame).ok()?;
        Some(BootstrapFrame { frame, game: Arc::clone(&slot.game), info: slot.info.clone() })
    }

    fn snapshot(&self, frame: StateFrame) -> Option<Snapshot<G>> {
        let slot = self.window.get(frame).ok()?;
        Some(Snapshot { frame, game: Arc::clone(&slot.game) })
    }

    /// Resolved state at `frame`, or `None` while it is still unresolved.
    ///
    /// A negative frame means the most recent resolved frame. Frames already
    /// evicted from the window answer with the oldest retained frame.
    pub fn final_state(&self, frame: StateFrame) -> Option<Snapshot<G>> {
        let start = self.window.start();
        if frame < 0 || frame <= start {
            return self.snapshot(start);
        }
        None
    }

    /// Best-effort state at `frame`, or `None` while no bundle has reached it.
    ///
    /// A negative frame means the newest known frame. The answer may change
    /// once late bundles for earlier frames arrive.
    pub fn fast_state(&self, frame: StateFrame) -> Option<Snapshot<G>> {
        if frame < 0 {
            return self.snapshot(self.global_frame);
        }
        if frame > self.global_frame {
            return None;
        }
        self.snapshot(frame.max(self.window.start()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        TestEvent, TestGame, contribution, initial_frame, membership, merged, test_params,
    };
    use proptest::prelude::*;

    const ME: u64 = 1234;
    const PEER: u64 = 1235;

    fn two_engine_reconciler() -> Reconciler<TestGame> {
        Reconciler::start(&test_params(ME), 10, initial_frame(&[ME, PEER]))
    }

    fn final_game(reconciler: &Reconciler<TestGame>, frame: StateFrame) -> TestGame {
        let snapshot = reconciler.final_state(frame).expect("frame should be resolved");
        (*snapshot.game).clone()
    }

    #[test]
    fn local_events_are_applied() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        for frame in 11..=15 {
            let effects = r.handle_local(merged(vec![
                contribution(frame, ME, vec![TestEvent::A(2), TestEvent::B(frame.to_string())]),
                contribution(frame, PEER, vec![TestEvent::A(1), TestEvent::B(frame.to_string())]),
            ]))?;
            assert_eq!(effects.resolved.len(), 1);
            assert_eq!(effects.broadcast.len(), 1);
        }

        let game = final_game(&r, 15);
        assert_eq!(game.thinks, 5);
        assert_eq!(game.a, 15);
        assert_eq!(game.b, "15");
        Ok(())
    }

    #[test]
    fn remote_events_are_applied() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        for frame in 11..=15 {
            let local = r.handle_local(contribution(
                frame,
                ME,
                vec![TestEvent::A(2), TestEvent::B(frame.to_string())],
            ))?;
            assert!(local.resolved.is_empty(), "frame {frame} waits for the peer");

            let remote = r.handle_remote(contribution(
                frame,
                PEER,
                vec![TestEvent::A(1), TestEvent::B(frame.to_string())],
            ))?;
            assert!(remote.broadcast.is_empty());
            assert_eq!(remote.resolved.len(), 1);
        }

        let game = final_game(&r, 15);
        assert_eq!(game.thinks, 5);
        assert_eq!(game.a, 15);
        // Engine order: ME (1234) applies B first, PEER (1235) last.
        assert_eq!(game.b, "15");
        Ok(())
    }

    #[test]
    fn membership_changes_gate_events() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        let me = EngineId::new(ME);
        let peer = EngineId::new(PEER);

        let mut drop_frame = contribution(11, ME, vec![TestEvent::A(1)]);
        drop_frame.bundle.get_mut(&me).unwrap().engine.push(EngineEvent::Dropped(peer));
        r.handle_local(merged(vec![drop_frame, contribution(11, PEER, vec![TestEvent::A(1)])]))?;

        let mut join_frame = contribution(12, ME, vec![TestEvent::A(1)]);
        join_frame.bundle.get_mut(&me).unwrap().engine.push(EngineEvent::Joined(peer));
        // Not a member during 11, so its events for 12 are ignored.
        r.handle_local(merged(vec![join_frame, contribution(12, PEER, vec![TestEvent::A(1)])]))?;

        r.handle_local(merged(vec![
            contribution(13, ME, vec![TestEvent::A(1)]),
            contribution(13, PEER, vec![TestEvent::A(1)]),
        ]))?;

        let game = final_game(&r, -1);
        assert_eq!(r.start_frame(), 13);
        assert_eq!(game.thinks, 3);
        assert_eq!(game.a, 5);
        Ok(())
    }

    #[test]
    fn dropped_engine_is_not_awaited() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        let effects = r.handle_local(membership(
            11,
            ME,
            vec![EngineEvent::Dropped(EngineId::new(PEER))],
        ))?;
        assert_eq!(effects.resolved.len(), 1);
        assert!(!effects.resolved[0].info.contains(EngineId::new(PEER)));

        let effects = r.handle_local(contribution(12, ME, vec![]))?;
        assert_eq!(effects.resolved.len(), 1, "only one member left");
        Ok(())
    }

    #[test]
    fn late_bundle_rewinds_and_replays() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        for frame in 11..=13 {
            r.handle_local(contribution(frame, ME, vec![TestEvent::A(1)]))?;
        }
        let before = r.fast_state(13).map(|s| s.game.a);
        assert_eq!(before, Some(3));

        // Peer's frame 12 and 13 arrive before 11.
        r.handle_remote(contribution(13, PEER, vec![TestEvent::A(100)]))?;
        r.handle_remote(contribution(12, PEER, vec![TestEvent::A(10)]))?;
        assert_eq!(r.start_frame(), 10);
        let effects = r.handle_remote(contribution(11, PEER, vec![TestEvent::A(1000)]))?;

        let frames: Vec<StateFrame> = effects.resolved.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![11, 12, 13]);
        let game = final_game(&r, 13);
        assert_eq!(game.a, 1113);
        assert_eq!(game.thinks, 3);
        Ok(())
    }

    #[test]
    fn duplicate_and_stale_bundles_are_ignored() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        r.handle_local(contribution(11, ME, vec![TestEvent::A(1)]))?;
        r.handle_remote(contribution(11, PEER, vec![TestEvent::A(1)]))?;
        assert_eq!(r.start_frame(), 11);

        // Echo of a resolved frame.
        let stale = r.handle_remote(contribution(11, PEER, vec![TestEvent::A(50)]))?;
        assert!(stale.resolved.is_empty());

        r.handle_remote(contribution(12, PEER, vec![TestEvent::A(5)]))?;
        r.handle_remote(contribution(12, PEER, vec![TestEvent::A(500)]))?;
        let effects = r.handle_local(contribution(12, ME, vec![]))?;
        assert_eq!(effects.resolved.len(), 1);

        assert_eq!(final_game(&r, 12).a, 7);
        Ok(())
    }

    #[test]
    fn events_from_unknown_engines_are_dropped() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        r.handle_remote(contribution(11, 99, vec![TestEvent::A(1000)]))?;
        r.handle_local(contribution(11, ME, vec![]))?;
        r.handle_remote(contribution(11, PEER, vec![]))?;
        assert_eq!(final_game(&r, 11).a, 0);
        Ok(())
    }

    #[test]
    fn bundle_past_window_is_fatal() {
        let mut r = two_engine_reconciler();
        // Capacity is max_frames + 1 = 26 frames starting at 10.
        assert!(r.handle_local(contribution(35, ME, vec![])).is_ok());
        let err = r.handle_remote(contribution(36, PEER, vec![])).err();
        match err {
            Some(e @ SyncError::WindowOutOfRange { .. }) => assert!(e.is_fatal()),
            other => panic!("expected window overflow, got {other:?}"),
        }
    }

    #[test]
    fn queries_follow_window_edges() -> anyhow::Result<()> {
        let mut r = two_engine_reconciler();
        for frame in 11..=14 {
            r.handle_local(contribution(frame, ME, vec![TestEvent::A(1)]))?;
        }
        r.handle_remote(contribution(11, PEER, vec![]))?;

        assert_eq!(r.final_state(-1).map(|s| s.frame), Some(11));
        assert_eq!(r.final_state(5).map(|s| s.frame), Some(11), "evicted frames answer oldest");
        assert!(r.final_state(12).is_none());

        assert_eq!(r.fast_state(-1).map(|s| s.frame), Some(14));
        assert_eq!(r.fast_state(13).map(|s| s.game.a), Some(3));
        assert_eq!(r.fast_state(3).map(|s| s.frame), Some(11));
        assert!(r.fast_state(15).is_none());
        Ok(())
    }

    #[test]
    fn bootstrapped_engine_skips_until_admitted() -> anyhow::Result<()> {
        let host = EngineId::new(PEER);
        let me = EngineId::new(ME);
        let boot = BootstrapFrame {
            frame: 20,
            game: Arc::new(TestGame { thinks: 20, a: 7, b: String::new() }),
            info: [host, me].into_iter().collect(),
        };
        let mut r = Reconciler::bootstrap(&test_params(ME), boot);
        assert_eq!(r.skip_to_frame(), Some(21));

        // Clock still behind the session.
        let early = r.handle_local(contribution(19, ME, vec![TestEvent::A(1)]))?;
        assert!(early.broadcast.is_empty());

        // Host bundles arrive first; frame 21 still waits for us.
        let held = r.handle_remote(contribution(21, PEER, vec![]))?;
        assert!(held.resolved.is_empty());

        // First local bundle after the gap fills 21 and 22 with empty contributions.
        let effects = r.handle_local(contribution(23, ME, vec![TestEvent::A(1)]))?;
        let sent: Vec<StateFrame> = effects.broadcast.iter().map(|b| b.frame).collect();
        assert_eq!(sent, vec![21, 22, 23]);
        assert_eq!(r.skip_to_frame(), None);
        assert_eq!(r.start_frame(), 21);

        r.handle_remote(contribution(22, PEER, vec![]))?;
        r.handle_remote(contribution(23, PEER, vec![]))?;
        let game = final_game(&r, 23);
        assert_eq!(game.thinks, 23);
        assert_eq!(game.a, 8);
        Ok(())
    }

    #[test]
    fn placeholder_is_not_simulated_until_data_arrives() -> anyhow::Result<()> {
        let boot = BootstrapFrame {
            frame: 5,
            game: Arc::new(TestGame::default()),
            info: [EngineId::new(PEER), EngineId::new(ME)].into_iter().collect(),
        };
        let mut r = Reconciler::bootstrap(&test_params(ME), boot);

        r.handle_remote(contribution(7, PEER, vec![]))?;
        assert_eq!(r.fast_state(6).map(|s| s.game.thinks), Some(0));
        assert_eq!(r.fast_state(7).map(|s| s.game.thinks), Some(1));

        r.handle_remote(contribution(6, PEER, vec![]))?;
        assert_eq!(r.fast_state(6).map(|s| s.game.thinks), Some(1));
        Ok(())
    }

    #[test]
    fn host_admission_moves_skip_marker() -> anyhow::Result<()> {
        let boot = BootstrapFrame {
            frame: 5,
            game: Arc::new(TestGame::default()),
            info: [EngineId::new(PEER)].into_iter().collect(),
        };
        let mut r = Reconciler::bootstrap(&test_params(ME), boot);
        r.handle_remote(membership(8, PEER, vec![EngineEvent::Joined(EngineId::new(ME))]))?;
        assert_eq!(r.skip_to_frame(), Some(8));

        let early = r.handle_local(contribution(7, ME, vec![]))?;
        assert!(early.broadcast.is_empty());
        Ok(())
    }

    #[test]
    fn bootstrap_matches_native_history() -> anyhow::Result<()> {
        let mut native = two_engine_reconciler();
        let mut boot = None;
        for frame in 11..=15 {
            native.handle_local(contribution(frame, ME, vec![TestEvent::A(frame)]))?;
            let effects =
                native.handle_remote(contribution(frame, PEER, vec![TestEvent::B(frame.to_string())]))?;
            boot = effects.resolved.into_iter().last().or(boot);
        }
        let boot = boot.expect("frame 15 resolved");
        assert_eq!(boot.frame, 15);

        let mut joined = Reconciler::bootstrap(&test_params(PEER), boot);
        for frame in 16..=20 {
            let mine = contribution(frame, ME, vec![TestEvent::A(frame * 2)]);
            let theirs = contribution(frame, PEER, vec![TestEvent::B(format!("p{frame}"))]);
            native.handle_local(mine.clone())?;
            native.handle_remote(theirs.clone())?;
            joined.handle_remote(mine)?;
            joined.handle_local(theirs)?;
        }

        for frame in 16..=20 {
            let a = native.fast_state(frame).map(|s| (*s.game).clone());
            let b = joined.fast_state(frame).map(|s| (*s.game).clone());
            assert_eq!(a, b, "frame {frame}");
        }
        assert_eq!(native.start_frame(), joined.start_frame());
        Ok(())
    }

    fn arb_events() -> impl Strategy<Value = Vec<TestEvent>> {
        prop::collection::vec(
            prop_oneof![
                (-50i64..50).prop_map(TestEvent::A),
                "[a-z]{1,3}".prop_map(TestEvent::B),
            ],
            0..3,
        )
    }

    proptest! {
        #[test]
        fn resolved_states_ignore_arrival_order(
            (mine, theirs, order) in prop::collection::vec((arb_events(), arb_events()), 1..12)
                .prop_flat_map(|frames| {
                    let n = frames.len();
                    let mine: Vec<_> = frames.iter().map(|(m, _)| m.clone()).collect();
                    let theirs: Vec<_> = frames.iter().map(|(_, t)| t.clone()).collect();
                    (Just(mine), Just(theirs), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
                })
        ) {
            let first = |frame: usize| 11 + frame as StateFrame;

            // In order: everything local then remote.
            let mut ordered = two_engine_reconciler();
            let mut ordered_frames = Vec::new();
            for (i, events) in mine.iter().enumerate() {
                ordered.handle_local(contribution(first(i), ME, events.clone())).unwrap();
            }
            for (i, events) in theirs.iter().enumerate() {
                let effects = ordered.handle_remote(contribution(first(i), PEER, events.clone())).unwrap();
                ordered_frames.extend(effects.resolved);
            }

            // Shuffled remote arrivals interleaved with local ones.
            let mut shuffled = two_engine_reconciler();
            let mut shuffled_frames = Vec::new();
            for (step, &i) in order.iter().enumerate() {
                shuffled_frames.extend(
                    shuffled.handle_remote(contribution(first(i), PEER, theirs[i].clone())).unwrap().resolved,
                );
                shuffled_frames.extend(
                    shuffled.handle_local(contribution(first(step), ME, mine[step].clone())).unwrap().resolved,
                );
            }

            prop_assert_eq!(ordered_frames.len(), mine.len());
            prop_assert_eq!(shuffled_frames.len(), mine.len());
            for (a, b) in ordered_frames.iter().zip(&shuffled_frames) {
                prop_assert_eq!(a.frame, b.frame);
                prop_assert_eq!(&*a.game, &*b.game);
                prop_assert_eq!(&a.info, &b.info);
            }
        }
    }
}
