//! Dispatch core: the single owner of registry, queues and timers
//!
//! Every input (new connections, lines, datagrams, disconnects, timer
//! expirations) arrives as a [`ServerEvent`] and is applied one at a time.

use super::queue::DoctorQueues;
use super::shutdown::ShutdownCoordinator;
use super::timeout::{AppointmentTimers, Expiry};
use crate::config::{ServerConfig, TimeoutPolicy};
use crate::event::ServerEvent;
use crate::session::{
    ClientKey, ClientRegistry, ConnId, DatagramSender, Endpoint, ParticipantId,
    RegistrationError, SessionHandle, TransportKind,
};
use clinic_shared::{messages, Command, Role};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Whether the dispatch loop keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Matches patients to doctors and drives every call to completion
pub struct Dispatcher {
    config: ServerConfig,
    registry: ClientRegistry,
    queues: DoctorQueues,
    timers: AppointmentTimers,
    shutdown: ShutdownCoordinator,
    datagrams: DatagramSender,
    /// Participants whose transport failed during the current event
    failed: Vec<ClientKey>,
}

impl Dispatcher {
    /// Create a dispatcher; `events` is the sender side of its own event stream
    pub fn new(
        config: ServerConfig,
        events: mpsc::Sender<ServerEvent>,
        datagrams: DatagramSender,
        stop: CancellationToken,
    ) -> Self {
        Self {
            registry: ClientRegistry::new(config.max_doctors),
            queues: DoctorQueues::new(),
            timers: AppointmentTimers::new(events),
            shutdown: ShutdownCoordinator::new(stop),
            datagrams,
            failed: Vec::new(),
            config,
        }
    }

    /// Process events until shutdown
    pub async fn run(mut self, mut events: mpsc::Receiver<ServerEvent>) {
        while let Some(event) = events.recv().await {
            if self.handle(event) == Flow::Shutdown {
                break;
            }
        }
        info!("Dispatcher stopped");
    }

    /// Apply a single event
    pub fn handle(&mut self, event: ServerEvent) -> Flow {
        if self.shutdown.is_terminated() {
            return Flow::Shutdown;
        }

        match event {
            ServerEvent::StreamOpened { session, token } => self.on_stream_opened(session, &token),
            ServerEvent::StreamLine { conn, line } => self.on_stream_line(conn, &line),
            ServerEvent::StreamClosed { conn } => self.disconnect(ClientKey::Stream(conn)),
            ServerEvent::Datagram { addr, text } => self.on_datagram(addr, &text),
            ServerEvent::Timeout(expiry) => self.on_timeout(expiry),
            ServerEvent::Interrupt => {
                info!("Operator requested shutdown");
                self.shutdown.shut_down(&mut self.registry, &mut self.timers);
            }
        }

        self.reap_failed();

        if self.shutdown.is_terminated() {
            Flow::Shutdown
        } else {
            Flow::Continue
        }
    }

    fn on_stream_opened(&mut self, session: SessionHandle, token: &str) {
        let endpoint = Endpoint::Stream(session);
        match Role::from_token(token) {
            Ok(role) => self.register(endpoint, role),
            Err(e) => self.refuse(&endpoint, RegistrationError::InvalidRole, &e.to_string()),
        }
    }

    fn on_stream_line(&mut self, conn: ConnId, line: &str) {
        match self.registry.lookup(&ClientKey::Stream(conn)).map(|p| p.id) {
            Some(id) => self.on_command(id, line),
            None => debug!(conn, "Line from unregistered connection dropped"),
        }
    }

    fn on_datagram(&mut self, addr: SocketAddr, text: &str) {
        if let Some(id) = self.registry.lookup(&ClientKey::Datagram(addr)).map(|p| p.id) {
            self.on_command(id, text);
            return;
        }

        let endpoint = Endpoint::Datagram {
            addr,
            sender: self.datagrams.clone(),
        };
        match Role::from_token(text) {
            Ok(Role::Patient) => self.register(endpoint, Role::Patient),
            // Doctors are stream-only
            Ok(Role::Doctor) => {
                self.refuse(&endpoint, RegistrationError::InvalidRole, "doctor over datagram")
            }
            Err(e) => self.refuse(&endpoint, RegistrationError::InvalidRole, &e.to_string()),
        }
    }

    fn register(&mut self, endpoint: Endpoint, role: Role) {
        let participant = match self.registry.register(endpoint.clone(), role) {
            Ok(participant) => participant,
            Err(e) => {
                self.refuse(&endpoint, e, "registration refused");
                return;
            }
        };

        let id = participant.id;
        let transport = participant.key().transport();
        info!(%id, ?transport, doctors = self.registry.doctor_count(), "Participant registered");
        self.send_to(id, &messages::welcome(id));

        match role {
            Role::Doctor => {
                self.queues.add_doctor(id);
                self.broadcast(&messages::connected(id));
            }
            Role::Patient => {
                let notice = match transport {
                    TransportKind::Stream => messages::connected(id),
                    TransportKind::Datagram => messages::connected_datagram(id),
                };
                self.broadcast(&notice);
                self.assign(id);
            }
        }
    }

    fn refuse(&mut self, endpoint: &Endpoint, reason: RegistrationError, detail: &str) {
        warn!(key = ?endpoint.key(), %reason, detail, "Registration refused");
        if let Err(e) = endpoint.send(&reason.to_string()) {
            debug!("Refusal not delivered: {}", e);
        }
        endpoint.close();
    }

    fn assign(&mut self, patient: ParticipantId) {
        match self.queues.assign_new_patient(patient) {
            Ok(doctor) => {
                info!(%patient, %doctor, "Patient queued");
                self.broadcast(&messages::assigned(patient, doctor));
            }
            Err(e) => warn!(%patient, "Patient not queued: {}", e),
        }
    }

    fn on_command(&mut self, id: ParticipantId, line: &str) {
        let command = Command::parse(line);
        match (id.role(), command) {
            (Role::Doctor, Some(Command::RequestNext)) => self.request_next(id),
            (Role::Doctor, _) => {
                debug!(%id, line, "Invalid doctor command");
                self.send_to(id, messages::INVALID_COMMAND);
            }
            (Role::Patient, Some(Command::Accept)) => self.accept(id),
            (Role::Patient, Some(Command::Reject)) => self.reject(id),
            (Role::Patient, _) => debug!(%id, line, "Patient message ignored"),
        }
    }

    fn request_next(&mut self, doctor: ParticipantId) {
        if let Some(previous) = self.queues.clear_current(doctor) {
            self.timers.cancel(previous);
            info!(%doctor, patient = %previous, "Appointment completed");
            self.broadcast(&messages::call_completed(previous));
            self.send_to(previous, messages::GET_WELL);
            self.release(previous);
        }
        self.call_next(doctor);
    }

    fn call_next(&mut self, doctor: ParticipantId) {
        match self.queues.call_next(doctor) {
            Ok(Some(patient)) => {
                info!(%doctor, %patient, "Patient called");
                let log = messages::call_log(patient, doctor);
                self.broadcast(&log);
                self.send_to(patient, &log);
                self.send_to(patient, &messages::call_prompt(doctor));
                if let Err(e) = self.timers.arm(doctor, patient, self.config.call_timeout) {
                    error!(%doctor, %patient, "{}", e);
                }
            }
            Ok(None) => {
                debug!(%doctor, "No patients waiting");
                self.send_to(doctor, messages::NO_PATIENTS_WAITING);
                self.maybe_shutdown();
            }
            Err(e) => error!(%doctor, "Cannot call next patient: {}", e),
        }
    }

    fn accept(&mut self, patient: ParticipantId) {
        let Some(doctor) = self.queues.doctor_calling(patient) else {
            debug!(%patient, "Stale accept dropped");
            return;
        };

        self.timers.cancel(patient);
        self.queues.clear_current(doctor);
        info!(%doctor, %patient, "Appointment accepted");
        self.send_to(patient, messages::GET_WELL);
        self.broadcast(&messages::accepted(patient, doctor));
        self.release(patient);
        self.maybe_shutdown();
    }

    fn reject(&mut self, patient: ParticipantId) {
        let Some(doctor) = self.queues.doctor_calling(patient) else {
            debug!(%patient, "Stale reject dropped");
            return;
        };

        self.timers.cancel(patient);
        self.queues.clear_current(doctor);
        if let Err(e) = self.queues.enqueue(doctor, patient) {
            error!(%doctor, %patient, "Requeue failed: {}", e);
        }
        info!(%doctor, %patient, "Appointment rejected, patient requeued");
        self.send_to(patient, messages::REJECTED_REQUEUED);
        self.broadcast(&messages::rejected(patient, doctor));
    }

    fn on_timeout(&mut self, expiry: Expiry) {
        let Expiry {
            doctor, patient, ..
        } = expiry;

        if !self.timers.fire(&expiry) || self.queues.current_of(doctor) != Some(patient) {
            debug!(%doctor, %patient, "Stale timeout dropped");
            return;
        }

        self.queues.clear_current(doctor);
        warn!(%doctor, %patient, policy = ?self.config.timeout_policy, "Call timed out");
        self.broadcast(&messages::timed_out(
            patient,
            self.config.call_timeout.as_secs(),
        ));

        if self.config.timeout_policy == TimeoutPolicy::Requeue {
            match self.queues.enqueue(doctor, patient) {
                Ok(()) => self.send_to(patient, messages::TIMED_OUT_REQUEUED),
                Err(e) => error!(%doctor, %patient, "Requeue failed: {}", e),
            }
        }

        self.call_next(doctor);
    }

    /// Remove a participant whose connection went away
    fn disconnect(&mut self, key: ClientKey) {
        let Some(participant) = self.registry.remove(&key) else {
            return;
        };
        participant.endpoint.close();

        let id = participant.id;
        info!(%id, "Participant disconnected");

        match id.role() {
            Role::Doctor => {
                if let Some(desk) = self.queues.remove_doctor(id) {
                    if let Some(current) = desk.current {
                        self.timers.cancel(current);
                    }
                    let orphans: Vec<_> = desk.current.into_iter().chain(desk.queued).collect();
                    match self.config.timeout_policy {
                        TimeoutPolicy::Requeue => {
                            for patient in orphans {
                                self.assign(patient);
                            }
                        }
                        TimeoutPolicy::Discard if !orphans.is_empty() => {
                            warn!(doctor = %id, ?orphans, "Patients left without a doctor");
                        }
                        TimeoutPolicy::Discard => {}
                    }
                }
            }
            Role::Patient => {
                self.timers.cancel(id);
                if let Some(placement) = self.queues.remove_patient(id) {
                    debug!(patient = %id, ?placement, "Removed from queue");
                }
            }
        }

        self.broadcast(&messages::left(id));
        self.maybe_shutdown();
    }

    /// Drop a resolved patient from every structure and close it
    fn release(&mut self, patient: ParticipantId) {
        self.timers.cancel(patient);
        self.queues.remove_patient(patient);
        if let Some(participant) = self.registry.remove_id(&patient) {
            participant.endpoint.close();
        }
    }

    fn maybe_shutdown(&mut self) {
        self.shutdown
            .maybe_shutdown(&self.queues, &mut self.registry, &mut self.timers);
    }

    fn send_to(&mut self, id: ParticipantId, text: &str) {
        let Some(participant) = self.registry.get(&id) else {
            return;
        };
        if let Err(e) = participant.endpoint.send(text) {
            warn!(%id, "Send failed: {}", e);
            self.failed.push(participant.key());
        }
    }

    /// Send a notice to every registered doctor
    fn broadcast(&mut self, text: &str) {
        for doctor in self.registry.doctors() {
            if let Err(e) = doctor.endpoint.send(text) {
                warn!(id = %doctor.id, "Broadcast failed: {}", e);
                self.failed.push(doctor.key());
            }
        }
    }

    /// Run the disconnect path for every participant whose send failed
    fn reap_failed(&mut self) {
        while let Some(key) = self.failed.pop() {
            if self.shutdown.is_terminated() {
                self.failed.clear();
                break;
            }
            self.disconnect(key);
        }
    }
}
