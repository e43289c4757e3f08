//! Synchronisation Bridge
//!
//! The only way controllers talk to a running engine. Each episode gets a
//! fresh set of channels:
//!
//! - a single-slot input mailbox; a submission completes once the engine
//!   drains it at the start of a step
//! - a `watch` cell holding the latest published snapshot, seeded with the
//!   step-0 snapshot at restart; waiters only take values written after they
//!   started waiting, `current_state` reads whatever is there
//! - a cancellation flag, raised when the episode ends or is superseded by a
//!   restart
//! - a count of callers currently awaiting a snapshot, which the engine uses
//!   to skip publication nobody is waiting for
//!
//! Restart swaps the whole set atomically, so a caller blocked on an old
//! episode is released with [`EpisodeOver`] and can never observe state from
//! the new one through its old wait.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{debug, trace};

use crate::game::input::InputBatch;
use crate::game::snapshot::Snapshot;

/// The episode has ended; call restart to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Episode is over")]
pub struct EpisodeOver;

/// A submitted batch waiting for intake.
pub(crate) struct PendingInput {
    pub(crate) batch: InputBatch,
    pub(crate) ack: oneshot::Sender<()>,
}

/// Channels for one episode.
pub struct EpisodeChannels {
    generation: u64,
    input_tx: mpsc::Sender<PendingInput>,
    state_tx: watch::Sender<Arc<Snapshot>>,
    over_tx: watch::Sender<bool>,
    /// Callers currently inside `await_next_state`.
    waiting: AtomicUsize,
    /// Signalled whenever a waiter leaves.
    claimed: Notify,
    /// Set by `current_state`, consumed by the next step.
    demand: AtomicBool,
}

impl EpisodeChannels {
    /// Create channels seeded with the episode's initial snapshot.
    pub(crate) fn new(initial: Snapshot) -> (Arc<Self>, mpsc::Receiver<PendingInput>) {
        let generation = initial.generation;
        let (input_tx, input_rx) = mpsc::channel(1);
        let (state_tx, _) = watch::channel(Arc::new(initial));
        let (over_tx, _) = watch::channel(false);

        let channels = Arc::new(Self {
            generation,
            input_tx,
            state_tx,
            over_tx,
            waiting: AtomicUsize::new(0),
            claimed: Notify::new(),
            demand: AtomicBool::new(false),
        });
        (channels, input_rx)
    }

    /// Generation these channels belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the episode has ended or been superseded.
    pub fn is_over(&self) -> bool {
        *self.over_tx.borrow()
    }

    /// Number of callers blocked in `await_next_state`.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.state_tx.borrow().clone()
    }

    /// Raise the cancellation flag. Idempotent.
    pub(crate) fn cancel(&self) {
        self.over_tx.send_replace(true);
    }

    /// Whether anyone wants this step's snapshot. Clears the
    /// `current_state` request.
    pub(crate) fn take_demand(&self) -> bool {
        let requested = self.demand.swap(false, Ordering::SeqCst);
        requested || self.waiting() > 0
    }

    /// Publish a snapshot, then give current waiters up to `claim_timeout`
    /// to pick it up. Returns false if some waiter did not claim in time.
    pub(crate) async fn publish(&self, snapshot: Snapshot, claim_timeout: Duration) -> bool {
        let step_id = snapshot.step_id;
        self.state_tx.send_replace(Arc::new(snapshot));

        if self.waiting() == 0 {
            return true;
        }
        let claimed = tokio::time::timeout(claim_timeout, self.all_claimed()).await.is_ok();
        if !claimed {
            trace!(step_id, waiting = self.waiting(), "snapshot not claimed in time");
        }
        claimed
    }

    async fn all_claimed(&self) {
        loop {
            let notified = self.claimed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.waiting() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Resolves once the flag is raised or its sender is gone.
async fn cancelled(over: &mut watch::Receiver<bool>) {
    let _ = over.wait_for(|over| *over).await;
}

/// Counts a caller as waiting for as long as it lives.
struct WaitGuard<'a> {
    channels: &'a EpisodeChannels,
}

impl<'a> WaitGuard<'a> {
    fn new(channels: &'a EpisodeChannels) -> Self {
        channels.waiting.fetch_add(1, Ordering::SeqCst);
        Self { channels }
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.channels.waiting.fetch_sub(1, Ordering::SeqCst);
        self.channels.claimed.notify_waiters();
    }
}

/// Cloneable handle onto the current episode's channels.
#[derive(Clone)]
pub struct SyncBridge {
    current: Arc<watch::Sender<Arc<EpisodeChannels>>>,
}

impl SyncBridge {
    pub(crate) fn new(channels: Arc<EpisodeChannels>) -> Self {
        let (current, _) = watch::channel(channels);
        Self {
            current: Arc::new(current),
        }
    }

    /// Channels of the current episode.
    pub fn channels(&self) -> Arc<EpisodeChannels> {
        self.current.borrow().clone()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.current.borrow().generation()
    }

    /// Install a new episode's channels and release everyone on the old ones.
    pub(crate) fn replace(&self, channels: Arc<EpisodeChannels>) {
        let old = self.current.send_replace(channels);
        old.cancel();
        debug!(generation = old.generation(), "superseded episode channels");
    }

    /// Hand a batch to the engine.
    ///
    /// Waits for the mailbox slot (one batch per tick) and then for the
    /// engine to drain it.
    pub async fn submit_input(&self, batch: InputBatch) -> Result<(), EpisodeOver> {
        let channels = self.channels();
        let mut over = channels.over_tx.subscribe();
        if *over.borrow() {
            return Err(EpisodeOver);
        }

        let (ack, acked) = oneshot::channel();
        let pending = PendingInput { batch, ack };

        tokio::select! {
            biased;
            _ = cancelled(&mut over) => return Err(EpisodeOver),
            sent = channels.input_tx.send(pending) => sent.map_err(|_| EpisodeOver)?,
        }

        tokio::select! {
            biased;
            // A batch drained by the final step still counts as consumed.
            result = acked => result.map_err(|_| EpisodeOver),
            _ = cancelled(&mut over) => Err(EpisodeOver),
        }
    }

    /// Latest published snapshot, without waiting.
    ///
    /// Also asks the engine to publish on its next step.
    pub fn current_state(&self) -> Result<Arc<Snapshot>, EpisodeOver> {
        let channels = self.channels();
        if channels.is_over() {
            return Err(EpisodeOver);
        }
        channels.demand.store(true, Ordering::SeqCst);
        Ok(channels.latest())
    }

    /// New per-caller handle.
    pub fn controller(&self) -> Controller {
        Controller {
            bridge: self.clone(),
            last_seen: None,
        }
    }
}

/// One caller's view of the bridge.
///
/// Remembers the last snapshot it returned so every
/// [`await_next_state`](Controller::await_next_state) is strictly newer.
pub struct Controller {
    bridge: SyncBridge,
    last_seen: Option<(u64, u64)>,
}

impl Controller {
    /// Wait for the next snapshot published after this call began.
    ///
    /// Whatever the cell already holds belongs to a past tick and is never
    /// returned; use [`current_state`](Controller::current_state) for that.
    /// Registering as a waiter makes the engine publish on its next step.
    pub async fn await_next_state(&mut self) -> Result<Arc<Snapshot>, EpisodeOver> {
        let channels = self.bridge.channels();
        let mut over = channels.over_tx.subscribe();
        let mut state = channels.state_tx.subscribe();
        // Only changes after this point count.
        state.borrow_and_update();
        let _guard = WaitGuard::new(&channels);

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut over) => return Err(EpisodeOver),
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(EpisodeOver);
                    }
                }
            }

            let latest = state.borrow_and_update().clone();
            if latest.is_newer_than(self.last_seen) {
                self.last_seen = Some((latest.generation, latest.step_id));
                return Ok(latest);
            }
        }
    }

    /// Latest snapshot, without waiting or affecting novelty.
    pub fn current_state(&self) -> Result<Arc<Snapshot>, EpisodeOver> {
        self.bridge.current_state()
    }

    /// Submit a batch through the shared bridge.
    pub async fn submit_input(&self, batch: InputBatch) -> Result<(), EpisodeOver> {
        self.bridge.submit_input(batch).await
    }

    /// `(generation, step_id)` of the last snapshot returned.
    pub fn last_seen(&self) -> Option<(u64, u64)> {
        self.last_seen
    }

    /// The underlying bridge.
    pub fn bridge(&self) -> &SyncBridge {
        &self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::game::state::{AgentId, EpisodeState};

    fn snapshot(generation: u64, step_id: u64) -> Snapshot {
        let config = SimConfig::default();
        let mut state = EpisodeState::new(&config, 2, generation);
        state.step_id = step_id;
        Snapshot::capture(&state, &config)
    }

    fn bridge(generation: u64) -> (SyncBridge, mpsc::Receiver<PendingInput>) {
        let (channels, input_rx) = EpisodeChannels::new(snapshot(generation, 0));
        (SyncBridge::new(channels), input_rx)
    }

    const CLAIM: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_current_state_flags_demand() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();
        assert!(!channels.take_demand());

        let state = bridge.current_state().unwrap();
        assert_eq!(state.step_id, 0);
        assert!(channels.take_demand());
        assert!(!channels.take_demand());
    }

    async fn wait_for_waiters(channels: &EpisodeChannels, count: usize) {
        while channels.waiting() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_await_returns_each_snapshot_once() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();
        let mut controller = bridge.controller();

        for step_id in 1..=3 {
            let waiter = tokio::spawn(async move {
                let next = controller.await_next_state().await.unwrap();
                (controller, next.step_id)
            });
            wait_for_waiters(&channels, 1).await;
            assert!(channels.take_demand());
            assert!(channels.publish(snapshot(0, step_id), CLAIM).await);

            let (returned, seen) = waiter.await.unwrap();
            controller = returned;
            assert_eq!(seen, step_id);
            assert_eq!(controller.last_seen(), Some((0, step_id)));
            assert_eq!(channels.waiting(), 0);
        }
    }

    #[tokio::test]
    async fn test_await_skips_snapshot_published_before_the_call() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();

        // Published while nobody waited: only current_state may see it.
        channels.publish(snapshot(0, 5), CLAIM).await;
        assert_eq!(bridge.current_state().unwrap().step_id, 5);

        let mut controller = bridge.controller();
        let waiter = tokio::spawn(async move { controller.await_next_state().await });
        wait_for_waiters(&channels, 1).await;

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        channels.publish(snapshot(0, 6), CLAIM).await;
        assert_eq!(waiter.await.unwrap().unwrap().step_id, 6);
    }

    #[tokio::test]
    async fn test_cancel_releases_waiters() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();

        let mut waiters = Vec::new();
        for _ in 0..5 {
            let mut controller = bridge.controller();
            waiters.push(tokio::spawn(async move { controller.await_next_state().await }));
        }
        wait_for_waiters(&channels, 5).await;

        channels.cancel();

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Err(EpisodeOver));
        }
        assert_eq!(channels.waiting(), 0);
        assert_eq!(bridge.current_state(), Err(EpisodeOver));
        assert_eq!(bridge.submit_input(InputBatch::new()).await, Err(EpisodeOver));
    }

    #[tokio::test]
    async fn test_submit_waits_for_intake() {
        let (bridge, mut rx) = bridge(0);

        let mut first = InputBatch::new();
        first.set(AgentId(0), true);
        let mut second = InputBatch::new();
        second.set(AgentId(1), true);

        let a = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.submit_input(first).await }
        });
        let pending = rx.recv().await.unwrap();
        assert!(pending.batch.0.contains_key(&AgentId(0)));

        let b = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.submit_input(second).await }
        });

        // A is still waiting for its ack.
        tokio::task::yield_now().await;
        assert!(!a.is_finished());

        pending.ack.send(()).unwrap();
        assert_eq!(a.await.unwrap(), Ok(()));

        let pending = rx.recv().await.unwrap();
        assert!(pending.batch.0.contains_key(&AgentId(1)));
        pending.ack.send(()).unwrap();
        assert_eq!(b.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_replace_releases_stale_callers() {
        let (bridge, _old_rx) = bridge(0);
        let old = bridge.channels();

        let mut controller = bridge.controller();
        let waiter = tokio::spawn(async move {
            let result = controller.await_next_state().await;
            (controller, result)
        });
        wait_for_waiters(&old, 1).await;

        let (fresh, _new_rx) = EpisodeChannels::new(snapshot(1, 0));
        bridge.replace(fresh.clone());

        let (mut controller, result) = waiter.await.unwrap();
        assert_eq!(result, Err(EpisodeOver));
        assert!(old.is_over());
        assert_eq!(bridge.generation(), 1);

        // The same controller follows the new episode.
        let waiter = tokio::spawn(async move { controller.await_next_state().await });
        wait_for_waiters(&fresh, 1).await;
        fresh.publish(snapshot(1, 1), CLAIM).await;

        let state = waiter.await.unwrap().unwrap();
        assert_eq!((state.generation, state.step_id), (1, 1));
    }

    #[tokio::test]
    async fn test_publish_without_waiters_is_immediate() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();

        assert!(channels.publish(snapshot(0, 4), Duration::from_secs(60)).await);
        assert_eq!(bridge.current_state().unwrap().step_id, 4);
    }

    #[tokio::test]
    async fn test_unclaimed_publish_times_out() {
        let (bridge, _rx) = bridge(0);
        let channels = bridge.channels();

        // A waiter that never gets polled again never claims.
        let _stuck = WaitGuard::new(&channels);
        assert!(!channels.publish(snapshot(0, 1), Duration::from_millis(5)).await);
    }
}
