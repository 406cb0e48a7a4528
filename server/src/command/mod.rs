//! Appointment dispatch for the server
//!
//! This module handles:
//! - Per-doctor waiting queues and the patient currently being called
//! - Call timers and their at-most-once expiry
//! - Applying client commands and disconnects to that state
//! - Deciding when the system has nothing left to do

mod dispatcher;
mod queue;
mod shutdown;
mod timeout;

pub use dispatcher::Dispatcher;
pub use timeout::Expiry;
