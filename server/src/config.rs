//! Server configuration

use clinic_shared::limits;
use std::time::Duration;

/// What happens to a patient whose call is abandoned
///
/// Applies when a called patient does not answer in time and when a doctor
/// disconnects while holding patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TimeoutPolicy {
    /// Drop the patient from every queue; it stays connected until shutdown
    #[default]
    Discard,
    /// Put the patient back at the tail of a queue
    Requeue,
}

/// Configuration for the dispatcher server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface both listeners bind to
    pub host: String,
    /// Port shared by the stream and datagram listeners
    pub port: u16,
    /// Maximum concurrently registered doctors
    pub max_doctors: usize,
    /// Deadline for a called patient to answer
    pub call_timeout: Duration,
    /// Handling of timed-out and orphaned patients
    pub timeout_policy: TimeoutPolicy,
    /// Bound of the merged event channel
    pub event_capacity: usize,
    /// Time given to session writers to flush after shutdown
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: limits::DEFAULT_PORT,
            max_doctors: limits::MAX_DOCTORS,
            call_timeout: Duration::from_secs(limits::CALL_TIMEOUT_SECS),
            timeout_policy: TimeoutPolicy::Discard,
            event_capacity: 100,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    /// Address string for both listeners
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
