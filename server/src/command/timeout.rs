//! Appointment deadline timers
//!
//! Each active call owns one single-shot timer. Expiry is delivered as a
//! [`ServerEvent::Timeout`] into the dispatcher's event stream, never applied
//! directly to shared state.

use crate::event::ServerEvent;
use crate::session::ParticipantId;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::debug;

/// Identifies one arming of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Payload of a fired timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub doctor: ParticipantId,
    pub patient: ParticipantId,
    pub timer: TimerId,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("A timer is already armed for {0}")]
    DuplicateTimer(ParticipantId),
}

struct ArmedTimer {
    doctor: ParticipantId,
    timer: TimerId,
    task: JoinHandle<()>,
}

/// Arms and cancels the per-call deadline timers
pub struct AppointmentTimers {
    armed: HashMap<ParticipantId, ArmedTimer>,
    events: mpsc::Sender<ServerEvent>,
    next_timer: u64,
}

impl AppointmentTimers {
    pub fn new(events: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            armed: HashMap::new(),
            events,
            next_timer: 0,
        }
    }

    /// Start the deadline for `patient`'s call with `doctor`
    pub fn arm(
        &mut self,
        doctor: ParticipantId,
        patient: ParticipantId,
        duration: Duration,
    ) -> Result<TimerId, TimerError> {
        if self.armed.contains_key(&patient) {
            return Err(TimerError::DuplicateTimer(patient));
        }

        self.next_timer += 1;
        let timer = TimerId(self.next_timer);
        let expiry = Expiry {
            doctor,
            patient,
            timer,
        };
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(ServerEvent::Timeout(expiry)).await;
        });

        debug!(%doctor, %patient, ?timer, "Timer armed");
        self.armed.insert(
            patient,
            ArmedTimer {
                doctor,
                timer,
                task,
            },
        );
        Ok(timer)
    }

    /// Disarm `patient`'s timer; a no-op if none is armed
    pub fn cancel(&mut self, patient: ParticipantId) -> bool {
        match self.armed.remove(&patient) {
            Some(armed) => {
                armed.task.abort();
                debug!(%patient, timer = ?armed.timer, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Consume a delivered expiry
    ///
    /// Returns true only for the first delivery of a timer that is still
    /// armed. A timer cancelled before its event was processed yields false.
    pub fn fire(&mut self, expiry: &Expiry) -> bool {
        match self.armed.get(&expiry.patient) {
            Some(armed) if armed.timer == expiry.timer && armed.doctor == expiry.doctor => {
                self.armed.remove(&expiry.patient);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self, patient: ParticipantId) -> bool {
        self.armed.contains_key(&patient)
    }

    /// The expiry that would be delivered for `patient`, if armed
    #[cfg(test)]
    pub fn pending(&self, patient: ParticipantId) -> Option<Expiry> {
        self.armed.get(&patient).map(|armed| Expiry {
            doctor: armed.doctor,
            patient,
            timer: armed.timer,
        })
    }

    #[cfg(test)]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }
}

impl Drop for AppointmentTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
