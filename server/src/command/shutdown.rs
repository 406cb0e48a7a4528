//! Global shutdown once no patient is waiting or being called

use super::queue::DoctorQueues;
use super::timeout::AppointmentTimers;
use crate::session::ClientRegistry;
use clinic_shared::messages;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Detects the terminal condition and tears every participant down
pub struct ShutdownCoordinator {
    /// Cancelled once shutdown starts (stop accepting new work)
    stop: CancellationToken,
    terminated: bool,
}

impl ShutdownCoordinator {
    pub fn new(stop: CancellationToken) -> Self {
        Self {
            stop,
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Shut down if no doctor has a queued or current patient
    pub fn maybe_shutdown(
        &mut self,
        queues: &DoctorQueues,
        registry: &mut ClientRegistry,
        timers: &mut AppointmentTimers,
    ) -> bool {
        if self.terminated || !queues.is_terminal() {
            return false;
        }
        self.shut_down(registry, timers);
        true
    }

    /// Announce shutdown to every participant, close them and stop accepting
    ///
    /// One-way: later calls do nothing.
    pub fn shut_down(&mut self, registry: &mut ClientRegistry, timers: &mut AppointmentTimers) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        timers.cancel_all();

        let participants = registry.drain();
        info!(participants = participants.len(), "{}", messages::SHUTDOWN);

        for participant in participants {
            if let Err(e) = participant.endpoint.send(messages::SHUTDOWN) {
                debug!(id = %participant.id, "Shutdown notice not delivered: {}", e);
            }
            participant.endpoint.close();
        }

        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Endpoint, Outgoing, ParticipantId, SessionHandle};
    use clinic_shared::Role;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_not_terminal_while_patients_wait() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timers = AppointmentTimers::new(tx);
        let mut registry = ClientRegistry::new(2);
        let mut queues = DoctorQueues::new();
        queues.add_doctor(ParticipantId::doctor(1));
        queues
            .enqueue(ParticipantId::doctor(1), ParticipantId::patient(1))
            .unwrap();

        let stop = CancellationToken::new();
        let mut coordinator = ShutdownCoordinator::new(stop.clone());
        assert!(!coordinator.maybe_shutdown(&queues, &mut registry, &mut timers));
        assert!(!stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_closes_everyone() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timers = AppointmentTimers::new(tx);
        let mut registry = ClientRegistry::new(2);
        let (session, mut outgoing) =
            SessionHandle::channel(1, "127.0.0.1:4001".parse().unwrap());
        registry.register(Endpoint::Stream(session), Role::Doctor).unwrap();

        let stop = CancellationToken::new();
        let mut coordinator = ShutdownCoordinator::new(stop.clone());
        assert!(coordinator.maybe_shutdown(&DoctorQueues::new(), &mut registry, &mut timers));
        assert!(coordinator.is_terminated());
        assert!(stop.is_cancelled());
        assert!(registry.is_empty());

        match outgoing.try_recv().unwrap() {
            Outgoing::Line(bytes) => {
                assert_eq!(&bytes[..], format!("{}\n", messages::SHUTDOWN).as_bytes())
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(outgoing.try_recv().unwrap(), Outgoing::Close));

        // One-way transition
        assert!(!coordinator.maybe_shutdown(&DoctorQueues::new(), &mut registry, &mut timers));
    }
}
