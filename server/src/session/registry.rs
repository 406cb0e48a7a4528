//! Client registry tracking every registered doctor and patient

use super::connection::{ConnId, SessionHandle, TransportError};
use super::datagram::DatagramSender;
use clinic_shared::{messages, Role};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Stable, server-assigned participant id ("Doktor1", "Hasta3", ...)
///
/// Ordering follows the registration number, so the lowest id is the
/// earliest registered participant of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId {
    role: Role,
    number: u32,
}

impl ParticipantId {
    pub fn new(role: Role, number: u32) -> Self {
        Self { role, number }
    }

    pub fn doctor(number: u32) -> Self {
        Self::new(Role::Doctor, number)
    }

    pub fn patient(number: u32) -> Self {
        Self::new(Role::Patient, number)
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role.token(), self.number)
    }
}

/// Transport a participant is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stream,
    Datagram,
}

/// Transport-specific key a participant is looked up by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Stream(ConnId),
    Datagram(SocketAddr),
}

impl ClientKey {
    pub fn transport(&self) -> TransportKind {
        match self {
            ClientKey::Stream(_) => TransportKind::Stream,
            ClientKey::Datagram(_) => TransportKind::Datagram,
        }
    }
}

/// How to reach a participant
#[derive(Debug, Clone)]
pub enum Endpoint {
    Stream(SessionHandle),
    Datagram {
        addr: SocketAddr,
        sender: DatagramSender,
    },
}

impl Endpoint {
    pub fn key(&self) -> ClientKey {
        match self {
            Endpoint::Stream(session) => ClientKey::Stream(session.conn),
            Endpoint::Datagram { addr, .. } => ClientKey::Datagram(*addr),
        }
    }

    pub fn send(&self, text: &str) -> Result<(), TransportError> {
        match self {
            Endpoint::Stream(session) => session.send(text),
            Endpoint::Datagram { addr, sender } => sender.send(*addr, text),
        }
    }

    /// Close the connection; datagram participants have nothing to close
    pub fn close(&self) {
        if let Endpoint::Stream(session) = self {
            session.close();
        }
    }
}

/// A registered doctor or patient
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub endpoint: Endpoint,
}

impl Participant {
    pub fn role(&self) -> Role {
        self.id.role()
    }

    pub fn key(&self) -> ClientKey {
        self.endpoint.key()
    }
}

/// Reasons a registration is refused; `Display` is the reply sent to the client
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{}", messages::CAPACITY_EXCEEDED)]
    CapacityExceeded,

    #[error("{}", messages::NO_DOCTOR_AVAILABLE)]
    NoDoctorAvailable,

    #[error("{}", messages::INVALID_ROLE)]
    InvalidRole,
}

/// Tracks all registered participants regardless of transport
pub struct ClientRegistry {
    participants: HashMap<ClientKey, Participant>,
    by_id: HashMap<ParticipantId, ClientKey>,
    max_doctors: usize,
    doctor_count: usize,
    doctors_issued: u32,
    patients_issued: u32,
}

impl ClientRegistry {
    pub fn new(max_doctors: usize) -> Self {
        Self {
            participants: HashMap::new(),
            by_id: HashMap::new(),
            max_doctors,
            doctor_count: 0,
            doctors_issued: 0,
            patients_issued: 0,
        }
    }

    /// Register a participant, assigning the next id for its role
    pub fn register(
        &mut self,
        endpoint: Endpoint,
        role: Role,
    ) -> Result<Participant, RegistrationError> {
        let id = match role {
            Role::Doctor => {
                if self.doctor_count >= self.max_doctors {
                    return Err(RegistrationError::CapacityExceeded);
                }
                self.doctor_count += 1;
                self.doctors_issued += 1;
                ParticipantId::doctor(self.doctors_issued)
            }
            Role::Patient => {
                if self.doctor_count == 0 {
                    return Err(RegistrationError::NoDoctorAvailable);
                }
                self.patients_issued += 1;
                ParticipantId::patient(self.patients_issued)
            }
        };

        let participant = Participant { id, endpoint };
        let key = participant.key();
        self.by_id.insert(id, key);
        self.participants.insert(key, participant.clone());

        Ok(participant)
    }

    pub fn lookup(&self, key: &ClientKey) -> Option<&Participant> {
        self.participants.get(key)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.by_id.get(id).and_then(|key| self.participants.get(key))
    }

    /// Remove a participant by its transport key
    pub fn remove(&mut self, key: &ClientKey) -> Option<Participant> {
        let participant = self.participants.remove(key)?;
        self.by_id.remove(&participant.id);
        if participant.role() == Role::Doctor {
            self.doctor_count -= 1;
        }
        Some(participant)
    }

    /// Remove a participant by id
    pub fn remove_id(&mut self, id: &ParticipantId) -> Option<Participant> {
        let key = *self.by_id.get(id)?;
        self.remove(&key)
    }

    /// Registered doctors, lowest id first
    pub fn doctors(&self) -> Vec<&Participant> {
        let mut doctors: Vec<_> = self
            .participants
            .values()
            .filter(|p| p.role() == Role::Doctor)
            .collect();
        doctors.sort_by_key(|p| p.id);
        doctors
    }

    /// Remove and return every participant, lowest id first
    pub fn drain(&mut self) -> Vec<Participant> {
        self.by_id.clear();
        self.doctor_count = 0;
        let mut all: Vec<_> = self.participants.drain().map(|(_, p)| p).collect();
        all.sort_by_key(|p| p.id);
        all
    }

    pub fn doctor_count(&self) -> usize {
        self.doctor_count
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
