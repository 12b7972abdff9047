//! FleetGuard: supervises a browser-automation fleet (one orchestrator plus
//! many short-lived workers), kills processes that outgrow their limits and
//! records resource sessions for later inspection.

pub mod classifier;
pub mod collector;
pub mod config;
pub mod enforcement;
pub mod executor;
pub mod notifier;
pub mod protocol;
pub mod recorder;
pub mod recovery;
pub mod report;
pub mod session;
pub mod shutdown;
pub mod socket;
pub mod terminator;
