//! Clinic Shared Protocol Types
//!
//! This crate provides the vocabulary and codec shared by the dispatcher
//! server and the interactive client: role tokens, commands, the fixed
//! notification texts and the newline-delimited line codec.

pub mod codec;
pub mod protocol;

pub use protocol::{Command, ProtocolError, Role};

/// Protocol limits for the system
pub mod limits {
    /// Maximum number of concurrently registered doctors
    pub const MAX_DOCTORS: usize = 2;

    /// How long a called patient has to answer, in seconds
    pub const CALL_TIMEOUT_SECS: u64 = 10;

    /// Maximum accepted line (and datagram) length in bytes
    pub const MAX_LINE_LEN: usize = 1024;

    /// Default port shared by the stream and datagram listeners
    pub const DEFAULT_PORT: u16 = 12345;
}

/// Fixed notification texts exchanged with clients
pub mod messages {
    pub const CAPACITY_EXCEEDED: &str = "Maksimum doktor sınırı dolu.";
    pub const NO_DOCTOR_AVAILABLE: &str = "Aktif doktor bulunmuyor.";
    pub const INVALID_ROLE: &str = "Geçersiz rol.";
    pub const INVALID_COMMAND: &str = "Sadece 'Hasta Kabul' komutu geçerlidir.";
    pub const NO_PATIENTS_WAITING: &str = "Bekleyen hasta bulunmamaktadır.";
    pub const GET_WELL: &str = "Geçmiş olsun";
    pub const REJECTED_REQUEUED: &str = "Randevu reddedildi, sıraya alındınız.";
    pub const TIMED_OUT_REQUEUED: &str = "Randevu zaman aşımına uğradı, sıraya alındınız.";
    pub const SHUTDOWN: &str = "Sistemde bekleyen hasta kalmadı. Sistem kapatılıyor...";

    /// Every successful registration reply starts with this
    pub const WELCOME_PREFIX: &str = "Hoşgeldiniz";
    /// Marker the client looks for to start its countdown
    pub const CALL_PROMPT_MARKER: &str = "onaylıyor musunuz";
    /// Marker contained in [`SHUTDOWN`]
    pub const SHUTDOWN_MARKER: &str = "Sistem kapatılıyor";

    pub fn welcome(id: impl std::fmt::Display) -> String {
        format!("{WELCOME_PREFIX} {id}")
    }

    pub fn connected(id: impl std::fmt::Display) -> String {
        format!("{id} sisteme bağlandı.")
    }

    pub fn connected_datagram(id: impl std::fmt::Display) -> String {
        format!("{id} UDP ile bağlandı.")
    }

    pub fn left(id: impl std::fmt::Display) -> String {
        format!("{id} sistemden ayrıldı.")
    }

    pub fn assigned(patient: impl std::fmt::Display, doctor: impl std::fmt::Display) -> String {
        format!("{patient}, {doctor}'a atandı.")
    }

    pub fn call_log(patient: impl std::fmt::Display, doctor: impl std::fmt::Display) -> String {
        format!("{patient} → {doctor}")
    }

    pub fn call_prompt(doctor: impl std::fmt::Display) -> String {
        format!("{doctor} tarafından çağrıldınız. Randevuyu onaylıyor musunuz (evet/hayır)")
    }

    pub fn call_completed(patient: impl std::fmt::Display) -> String {
        format!("{patient} için randevu tamamlandı.")
    }

    pub fn accepted(patient: impl std::fmt::Display, doctor: impl std::fmt::Display) -> String {
        format!("{patient} {doctor} randevusunu kabul etti")
    }

    pub fn rejected(patient: impl std::fmt::Display, doctor: impl std::fmt::Display) -> String {
        format!("{patient} {doctor} randevusunu reddetti")
    }

    pub fn timed_out(patient: impl std::fmt::Display, secs: u64) -> String {
        format!("{patient} {secs} saniye içinde cevap vermedi, sıradaki hasta çağrılıyor...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_prompt_contains_marker() {
        let prompt = messages::call_prompt("Doktor1");
        assert!(prompt.starts_with("Doktor1 tarafından"));
        assert!(prompt.contains(messages::CALL_PROMPT_MARKER));
    }

    #[test]
    fn test_shutdown_contains_marker() {
        assert!(messages::SHUTDOWN.contains(messages::SHUTDOWN_MARKER));
    }

    #[test]
    fn test_timeout_text_uses_seconds() {
        assert_eq!(
            messages::timed_out("Hasta2", 10),
            "Hasta2 10 saniye içinde cevap vermedi, sıradaki hasta çağrılıyor..."
        );
    }
}
