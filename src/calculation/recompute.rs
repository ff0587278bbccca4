//! Latest-request-wins recomputation.
//!
//! Every recompute request for an entity stores a fresh token before work
//! starts. A worker only commits results whose token is still the stored
//! one, so a slow run can never overwrite the output of a newer request.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::store::PayrollRepository;

use super::backdated::{BackdatedCalculator, BackdatedOutcome};

/// Identifies one recompute request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecomputeToken(Uuid);

impl RecomputeToken {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    /// The token's uuid.
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// The current token of every entity.
#[derive(Debug, Default)]
pub struct RecomputeGuard {
    tokens: DashMap<String, RecomputeToken>,
}

impl RecomputeGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores and returns a fresh token for `entity_id`, superseding any
    /// earlier one.
    pub fn issue(&self, entity_id: &str) -> RecomputeToken {
        let token = RecomputeToken::fresh();
        self.tokens.insert(entity_id.to_string(), token);
        token
    }

    /// Returns true while `token` is the latest issued for `entity_id`.
    pub fn is_current(&self, entity_id: &str, token: RecomputeToken) -> bool {
        self.tokens
            .get(entity_id)
            .is_some_and(|current| *current == token)
    }

    /// Runs `commit` only if `token` is still current, then releases the
    /// entity's entry.
    ///
    /// The entity's entry stays locked while `commit` runs, so no newer
    /// token can be issued half-way through a commit.
    pub fn commit_if_current<T, F>(&self, entity_id: &str, token: RecomputeToken, commit: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        let entry = self.tokens.get_mut(entity_id)?;
        if *entry != token {
            return None;
        }
        let result = commit();
        drop(entry);
        self.release(entity_id, token);
        Some(result)
    }

    /// Forgets `entity_id` unless a newer token was issued meanwhile.
    pub fn release(&self, entity_id: &str, token: RecomputeToken) {
        self.tokens.remove_if(entity_id, |_, current| *current == token);
    }

    /// Number of entities with an outstanding request.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true when no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// A queued recompute request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// The entity to recompute.
    pub entity_id: String,
    /// The token issued for this request.
    pub token: RecomputeToken,
}

/// The work a recompute worker performs for one entity.
pub trait RecomputeHandler: Send {
    /// The result handed from `compute` to `commit`.
    type Output: Send;

    /// Computes a result without side effects.
    fn compute(&mut self, entity_id: &str) -> EngineResult<Self::Output>;

    /// Stores a result. Only called while the request is current.
    fn commit(&mut self, entity_id: &str, output: Self::Output) -> EngineResult<()>;
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items whose result was committed.
    pub committed: usize,
    /// Items skipped or discarded because a newer request existed.
    pub stale: usize,
    /// Items whose compute or commit failed.
    pub failed: usize,
}

/// Sends recompute requests to a worker.
#[derive(Debug, Clone)]
pub struct RecomputeQueue {
    guard: Arc<RecomputeGuard>,
    sender: mpsc::UnboundedSender<WorkItem>,
}

impl RecomputeQueue {
    /// Creates a queue and the receiver its worker drains.
    pub fn new(guard: Arc<RecomputeGuard>) -> (Self, mpsc::UnboundedReceiver<WorkItem>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { guard, sender }, receiver)
    }

    /// Issues a token for `entity_id` and queues the request.
    pub fn request(&self, entity_id: &str) -> EngineResult<RecomputeToken> {
        let token = self.guard.issue(entity_id);
        self.sender
            .send(WorkItem {
                entity_id: entity_id.to_string(),
                token,
            })
            .map_err(|_| EngineError::CalculationError {
                message: "recompute worker has stopped".to_string(),
            })?;
        Ok(token)
    }
}

/// Drains `receiver` until every sender is dropped.
pub async fn run_worker<H: RecomputeHandler>(
    mut receiver: mpsc::UnboundedReceiver<WorkItem>,
    guard: Arc<RecomputeGuard>,
    mut handler: H,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    while let Some(item) = receiver.recv().await {
        process(&item, &guard, &mut handler, &mut stats);
    }
    stats
}

fn process<H: RecomputeHandler>(
    item: &WorkItem,
    guard: &RecomputeGuard,
    handler: &mut H,
    stats: &mut WorkerStats,
) {
    if !guard.is_current(&item.entity_id, item.token) {
        debug!(entity_id = %item.entity_id, "Skipping superseded recompute request");
        stats.stale += 1;
        return;
    }

    let output = match handler.compute(&item.entity_id) {
        Ok(output) => output,
        Err(error) => {
            warn!(entity_id = %item.entity_id, error = %error, "Recompute failed");
            guard.release(&item.entity_id, item.token);
            stats.failed += 1;
            return;
        }
    };

    match guard.commit_if_current(&item.entity_id, item.token, || {
        handler.commit(&item.entity_id, output)
    }) {
        Some(Ok(())) => stats.committed += 1,
        Some(Err(error)) => {
            warn!(entity_id = %item.entity_id, error = %error, "Recompute commit failed");
            stats.failed += 1;
        }
        None => {
            warn!(entity_id = %item.entity_id, "Discarding stale recompute result");
            stats.stale += 1;
        }
    }
}

impl<R: PayrollRepository + ?Sized> RecomputeHandler for BackdatedCalculator<'_, R> {
    type Output = BackdatedOutcome;

    fn compute(&mut self, slot_id: &str) -> EngineResult<BackdatedOutcome> {
        BackdatedCalculator::compute(self, slot_id)
    }

    fn commit(&mut self, _slot_id: &str, outcome: BackdatedOutcome) -> EngineResult<()> {
        self.persist(outcome).map(|_| ())
    }
}
