//! The deterministic execution loop.
//!
//! Executions are stored and advanced in creation order. New ones are
//! staged first and initialized at the start of the next scheduler pass,
//! all before any execution ticks, so a batch of simultaneous launches
//! always resolves the same way no matter how it was submitted.

use std::mem;
use std::time::{Duration, Instant};

use crate::executions::{Execution, ExecutionId, ExecutionKind, TickContext};

/// Wall-clock spent per execution family during one pass. Feeds the
/// simulation metrics; never part of the lockstep state.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickTimings {
    pub attack: Duration,
    pub cluster: Duration,
}

impl TickTimings {
    fn record(&mut self, kind: ExecutionKind, elapsed: Duration) {
        match kind {
            ExecutionKind::Attack => self.attack += elapsed,
            ExecutionKind::ClusterSweep => self.cluster += elapsed,
        }
    }
}

#[derive(Default)]
pub struct TickScheduler {
    executions: Vec<Execution>,
    staged: Vec<Execution>,
    next_id: ExecutionId,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an execution for the next pass. The closure receives the
    /// assigned id so the execution can salt its random stream with it.
    pub fn spawn(&mut self, build: impl FnOnce(ExecutionId) -> Execution) -> ExecutionId {
        let id = self.next_id;
        self.next_id += 1;
        self.staged.push(build(id));
        id
    }

    pub fn len(&self) -> usize {
        self.executions.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty() && self.staged.is_empty()
    }

    /// One pass: initialize everything staged, in creation order, then
    /// advance every active execution, then drop the finished ones.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> TickTimings {
        let mut timings = TickTimings::default();
        let staged = mem::take(&mut self.staged);
        for mut execution in staged {
            let started = Instant::now();
            execution.init(ctx);
            timings.record(execution.kind(), started.elapsed());
            self.executions.push(execution);
        }
        for execution in &mut self.executions {
            if !execution.is_active() {
                continue;
            }
            let started = Instant::now();
            execution.tick(ctx);
            timings.record(execution.kind(), started.elapsed());
        }
        self.executions.retain(Execution::is_active);
        timings
    }
}
