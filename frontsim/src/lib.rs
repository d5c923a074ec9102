//! Headless driver pieces for the frontline simulation.
//!
//! The binary in this crate wires these together: [`scenario`] turns an
//! ASCII map into a running [`frontsim_core::Simulation`], and [`bot`]
//! supplies scripted player commands so unattended games actually fight.

pub mod bot;
pub mod scenario;
