//! Per-doctor waiting queues and current-call slots

use crate::session::ParticipantId;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Errors from queue operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Unknown doctor: {0}")]
    UnknownDoctor(ParticipantId),

    #[error("No doctor is registered")]
    NoDoctors,

    #[error("{doctor} is still calling {patient}")]
    CallInProgress {
        doctor: ParticipantId,
        patient: ParticipantId,
    },

    #[error("{0} is already queued or called")]
    AlreadyPlaced(ParticipantId),
}

/// Where a patient currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Waiting in this doctor's queue
    Queued(ParticipantId),
    /// Being called by this doctor
    Called(ParticipantId),
}

/// What a doctor was holding when it left
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClosedDesk {
    pub current: Option<ParticipantId>,
    pub queued: Vec<ParticipantId>,
}

#[derive(Debug, Default)]
struct Desk {
    queue: VecDeque<ParticipantId>,
    current: Option<ParticipantId>,
}

/// Owns every doctor's FIFO and its single current-call slot
#[derive(Debug, Default)]
pub struct DoctorQueues {
    desks: BTreeMap<ParticipantId, Desk>,
}

impl DoctorQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_doctor(&mut self, doctor: ParticipantId) {
        self.desks.entry(doctor).or_default();
    }

    /// Drop a doctor's desk, returning the patients it held
    pub fn remove_doctor(&mut self, doctor: ParticipantId) -> Option<ClosedDesk> {
        self.desks.remove(&doctor).map(|desk| ClosedDesk {
            current: desk.current,
            queued: desk.queue.into(),
        })
    }

    /// Append a patient to the tail of a doctor's queue
    pub fn enqueue(
        &mut self,
        doctor: ParticipantId,
        patient: ParticipantId,
    ) -> Result<(), QueueError> {
        if self.locate(patient).is_some() {
            return Err(QueueError::AlreadyPlaced(patient));
        }
        let desk = self
            .desks
            .get_mut(&doctor)
            .ok_or(QueueError::UnknownDoctor(doctor))?;
        desk.queue.push_back(patient);
        Ok(())
    }

    /// Queue a new patient at the doctor with the shortest queue
    ///
    /// Ties go to the lowest doctor id.
    pub fn assign_new_patient(&mut self, patient: ParticipantId) -> Result<ParticipantId, QueueError> {
        let doctor = self
            .desks
            .iter()
            .min_by_key(|(_, desk)| desk.queue.len())
            .map(|(id, _)| *id)
            .ok_or(QueueError::NoDoctors)?;
        self.enqueue(doctor, patient)?;
        Ok(doctor)
    }

    /// Move the head of a doctor's queue into its current slot
    ///
    /// Returns `Ok(None)` if nobody is waiting. The slot must already be empty.
    pub fn call_next(&mut self, doctor: ParticipantId) -> Result<Option<ParticipantId>, QueueError> {
        let desk = self
            .desks
            .get_mut(&doctor)
            .ok_or(QueueError::UnknownDoctor(doctor))?;
        if let Some(patient) = desk.current {
            return Err(QueueError::CallInProgress { doctor, patient });
        }
        desk.current = desk.queue.pop_front();
        Ok(desk.current)
    }

    /// Empty a doctor's current slot, returning who was in it
    pub fn clear_current(&mut self, doctor: ParticipantId) -> Option<ParticipantId> {
        self.desks.get_mut(&doctor)?.current.take()
    }

    pub fn current_of(&self, doctor: ParticipantId) -> Option<ParticipantId> {
        self.desks.get(&doctor)?.current
    }

    /// The doctor currently calling `patient`, if any
    pub fn doctor_calling(&self, patient: ParticipantId) -> Option<ParticipantId> {
        match self.locate(patient)? {
            Placement::Called(doctor) => Some(doctor),
            Placement::Queued(_) => None,
        }
    }

    pub fn locate(&self, patient: ParticipantId) -> Option<Placement> {
        self.desks.iter().find_map(|(doctor, desk)| {
            if desk.current == Some(patient) {
                Some(Placement::Called(*doctor))
            } else if desk.queue.contains(&patient) {
                Some(Placement::Queued(*doctor))
            } else {
                None
            }
        })
    }

    /// Take a patient out of whichever queue or slot holds it
    pub fn remove_patient(&mut self, patient: ParticipantId) -> Option<Placement> {
        let placement = self.locate(patient)?;
        match placement {
            Placement::Called(doctor) => {
                self.clear_current(doctor);
            }
            Placement::Queued(doctor) => {
                if let Some(desk) = self.desks.get_mut(&doctor) {
                    desk.queue.retain(|p| *p != patient);
                }
            }
        }
        Some(placement)
    }

    #[cfg(test)]
    pub fn queued(&self, doctor: ParticipantId) -> Vec<ParticipantId> {
        self.desks
            .get(&doctor)
            .map(|desk| desk.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every active call as `(doctor, patient)`
    #[cfg(test)]
    pub fn calls(&self) -> Vec<(ParticipantId, ParticipantId)> {
        self.desks
            .iter()
            .filter_map(|(doctor, desk)| desk.current.map(|patient| (*doctor, patient)))
            .collect()
    }

    /// True when no doctor has a queued or current patient
    pub fn is_terminal(&self) -> bool {
        self.desks
            .values()
            .all(|desk| desk.queue.is_empty() && desk.current.is_none())
    }
}
