//! Event fan-out to registered sinks.
//!
//! Sinks observe the simulation and can never change it. Sink failures
//! are logged and swallowed: a broken consumer must not stall the tick
//! loop or desync a replica.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{Owner, PlayerId};
use crate::state::Tick;

/// Gameplay-visible events emitted while executing a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    AttackLaunched {
        tick: Tick,
        attacker: PlayerId,
        target: Owner,
        troops: f64,
    },
    /// An attack ended by retreat, whether ordered or forced. Natural
    /// exhaustion of an attack emits nothing.
    AttackCancelled {
        tick: Tick,
        attacker: PlayerId,
        target: Owner,
        survivors: f64,
    },
    /// A surrendered region changed hands wholesale.
    TerritoryCaptured {
        tick: Tick,
        from: PlayerId,
        to: PlayerId,
        tiles: u32,
    },
    PlayerDefeated {
        tick: Tick,
        player: PlayerId,
        conqueror: PlayerId,
    },
    /// Free-form notice addressed to one player.
    Message {
        tick: Tick,
        player: PlayerId,
        text: String,
    },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A consumer of game events.
pub trait EventSink: Send {
    /// Short name used in failure logs.
    fn name(&self) -> &str;

    fn on_event(&self, event: &GameEvent) -> Result<(), SinkError>;
}

/// Holds every registered sink and fans each event out to all of them.
#[derive(Default)]
pub struct EventRegistry {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Box<dyn EventSink>) {
        log::info!("registered event sink: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: &GameEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.on_event(event) {
                log::error!("event sink '{}' failed: {e}", sink.name());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("EventRegistry")
            .field("sinks", &names)
            .finish()
    }
}

/// Writes each event as one JSON object per line.
pub struct JsonlEventSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlEventSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> EventSink for JsonlEventSink<W> {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn on_event(&self, event: &GameEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(event)?;
        // A poisoned lock still holds a usable writer for appends.
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

/// Buffers events in memory behind a shared handle. Register one clone
/// and keep the other to read the stream back.
#[derive(Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<GameEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn name(&self) -> &str {
        "memory"
    }

    fn on_event(&self, event: &GameEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
