//! Tick-driven executions: autonomous routines the scheduler advances
//! once per tick until they deactivate.
//!
//! An execution is initialized exactly once, before its first tick, and
//! ticking one that was never initialized is a hard fault rather than a
//! recoverable error: it means the scheduler contract was broken.

pub mod attack;
pub mod cluster;

pub use attack::{AttackExecution, AttackOrder};
pub use cluster::ClusterSweep;

use crate::observer::EventRegistry;
use crate::rules::ConquestRules;
use crate::state::Game;

/// Creation-ordered execution identifier. Doubles as the deterministic
/// tie-break wherever two executions would otherwise be equivalent, and
/// salts each execution's random stream.
pub type ExecutionId = u64;

/// Mutable context threaded through init and tick.
pub struct TickContext<'a> {
    pub game: &'a mut Game,
    pub rules: &'a dyn ConquestRules,
    pub events: &'a EventRegistry,
}

/// The closed set of execution kinds.
///
/// An enum rather than a trait object: the scheduler attributes per-kind
/// timings by matching, and every kind is known at compile time.
pub enum Execution {
    Attack(AttackExecution),
    ClusterSweep(ClusterSweep),
}

impl Execution {
    /// One-time setup, run by the scheduler before the first tick.
    pub fn init(&mut self, ctx: &mut TickContext<'_>) {
        match self {
            Execution::Attack(e) => e.init(ctx),
            Execution::ClusterSweep(e) => e.init(ctx),
        }
    }

    pub fn tick(&mut self, ctx: &mut TickContext<'_>) {
        match self {
            Execution::Attack(e) => e.tick(ctx),
            Execution::ClusterSweep(e) => e.tick(ctx),
        }
    }

    /// Inactive executions are pruned by the scheduler at the end of the
    /// tick and never run again.
    pub fn is_active(&self) -> bool {
        match self {
            Execution::Attack(e) => e.is_active(),
            Execution::ClusterSweep(e) => e.is_active(),
        }
    }

    pub(crate) fn kind(&self) -> ExecutionKind {
        match self {
            Execution::Attack(_) => ExecutionKind::Attack,
            Execution::ClusterSweep(_) => ExecutionKind::ClusterSweep,
        }
    }
}

/// Discriminant used for metrics attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecutionKind {
    Attack,
    ClusterSweep,
}
