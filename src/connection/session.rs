//! Interactive session: server messages on one side, console input on the other

use crate::transport::{LinePair, LineReader, LineWriter};
use anyhow::Result;
use clinic_shared::{limits, messages, Command, Role};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval};
use tracing::{debug, info};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The server refused the registration with this reason
    Refused(String),
    /// The appointment was completed
    GetWell,
    /// The server announced it is closing
    Shutdown,
    /// The server closed the connection
    ServerClosed,
    /// Console input ended
    InputClosed,
    /// The user pressed Ctrl-C
    Interrupted,
}

/// Classify a server message that ends the session
fn terminal(line: &str) -> Option<Exit> {
    if line.contains(messages::GET_WELL) {
        Some(Exit::GetWell)
    } else if line.contains(messages::SHUTDOWN_MARKER) {
        Some(Exit::Shutdown)
    } else {
        None
    }
}

/// One-second ticks counting down an answer deadline
struct Countdown {
    ticks: Option<Interval>,
    remaining: u64,
}

impl Countdown {
    fn new() -> Self {
        Self {
            ticks: None,
            remaining: 0,
        }
    }

    fn start(&mut self, secs: u64) {
        self.ticks = Some(interval(Duration::from_secs(1)));
        self.remaining = secs;
    }

    fn stop(&mut self) {
        self.ticks = None;
        self.remaining = 0;
    }

    fn is_running(&self) -> bool {
        self.ticks.is_some() && self.remaining > 0
    }

    /// Wait for the next tick and return the seconds left at that tick
    async fn tick(&mut self) -> u64 {
        match self.ticks.as_mut() {
            Some(ticks) => {
                ticks.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        let left = self.remaining;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.ticks = None;
        }
        left
    }
}

/// A registered doctor or patient talking to the dispatcher
pub struct ClientSession<W> {
    role: Role,
    reader: Box<dyn LineReader>,
    writer: Box<dyn LineWriter>,
    console: W,
    countdown_secs: u64,
}

impl<W: AsyncWrite + Unpin + Send> ClientSession<W> {
    pub fn new(role: Role, (reader, writer): LinePair, console: W) -> Self {
        Self {
            role,
            reader,
            writer,
            console,
            countdown_secs: limits::CALL_TIMEOUT_SECS,
        }
    }

    /// Run until the server resolves the session, input ends or `interrupt` fires
    pub async fn run<F>(mut self, mut input: mpsc::Receiver<String>, interrupt: F) -> Result<Exit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let exit = match self.register().await? {
            Some(exit) => exit,
            None => self.serve(&mut input, interrupt.as_mut()).await?,
        };

        if let Err(e) = self.writer.shutdown().await {
            debug!("Transport shutdown failed: {}", e);
        }
        info!(?exit, "Session ended");
        Ok(exit)
    }

    /// Send the role token and show the server's answer
    async fn register(&mut self) -> Result<Option<Exit>> {
        self.writer.send_line(self.role.token()).await?;

        let Some(reply) = self.reader.recv_line().await? else {
            return Ok(Some(Exit::ServerClosed));
        };
        self.show_server(&reply).await?;

        if reply.starts_with(messages::WELCOME_PREFIX) {
            info!(role = %self.role, "Registered");
            Ok(None)
        } else {
            Ok(Some(Exit::Refused(reply)))
        }
    }

    async fn serve<F>(
        &mut self,
        input: &mut mpsc::Receiver<String>,
        mut interrupt: std::pin::Pin<&mut F>,
    ) -> Result<Exit>
    where
        F: Future<Output = ()>,
    {
        let mut countdown = Countdown::new();

        loop {
            tokio::select! {
                _ = &mut interrupt => {
                    self.print("[⛔] İstemci kapatılıyor...").await?;
                    return Ok(Exit::Interrupted);
                }
                line = self.reader.recv_line() => {
                    let Some(line) = line? else {
                        return Ok(Exit::ServerClosed);
                    };
                    self.show_server(&line).await?;
                    if let Some(exit) = terminal(&line) {
                        return Ok(exit);
                    }
                    if line.to_lowercase().contains(messages::CALL_PROMPT_MARKER) {
                        countdown.start(self.countdown_secs);
                    }
                }
                line = input.recv() => {
                    let Some(line) = line else {
                        return Ok(Exit::InputClosed);
                    };
                    self.submit(line.trim(), &mut countdown).await?;
                }
                left = countdown.tick(), if countdown.is_running() => {
                    self.print(&format!("[Sayaç] {left} saniye kaldı...")).await?;
                }
            }
        }
    }

    /// Forward one line of user input, applying the local role checks
    async fn submit(&mut self, line: &str, countdown: &mut Countdown) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }

        let command = Command::parse(line);
        if self.role == Role::Doctor && !command.is_some_and(|c| c.allowed_for(Role::Doctor)) {
            return self.print(messages::INVALID_COMMAND).await;
        }
        if matches!(command, Some(Command::Accept | Command::Reject)) {
            countdown.stop();
        }

        debug!(line, "Sending");
        self.writer.send_line(line).await
    }

    async fn show_server(&mut self, line: &str) -> Result<()> {
        self.print(&format!("[Sunucu] {line}")).await
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.console.write_all(text.as_bytes()).await?;
        self.console.write_all(b"\n").await?;
        self.console.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, DuplexStream};

    /// Server side fed by the test
    struct ScriptedReader(mpsc::UnboundedReceiver<String>);

    #[async_trait]
    impl LineReader for ScriptedReader {
        async fn recv_line(&mut self) -> Result<Option<String>> {
            Ok(self.0.recv().await)
        }
    }

    /// Records everything the session sends
    struct RecordingWriter(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl LineWriter for RecordingWriter {
        async fn send_line(&mut self, line: &str) -> Result<()> {
            self.0.send(line.to_string())?;
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Rig {
        server: mpsc::UnboundedSender<String>,
        sent: mpsc::UnboundedReceiver<String>,
        input: mpsc::Sender<String>,
        screen: DuplexStream,
    }

    impl Rig {
        /// Spawn a session; `interrupt` completes when the sender fires or drops
        fn spawn(
            role: Role,
            greeting: &str,
        ) -> (
            Self,
            tokio::sync::oneshot::Sender<()>,
            tokio::task::JoinHandle<Result<Exit>>,
        ) {
            let (server, script) = mpsc::unbounded_channel();
            let (record, sent) = mpsc::unbounded_channel();
            let (input, input_rx) = mpsc::channel(8);
            let (console, screen) = tokio::io::duplex(64 * 1024);
            let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

            server.send(greeting.to_string()).unwrap();
            let session = ClientSession::new(
                role,
                (
                    Box::new(ScriptedReader(script)),
                    Box::new(RecordingWriter(record)),
                ),
                console,
            );
            let handle = tokio::spawn(session.run(input_rx, async move {
                let _ = stop_rx.await;
            }));

            (
                Self {
                    server,
                    sent,
                    input,
                    screen,
                },
                stop_tx,
                handle,
            )
        }

        async fn screen_text(mut self) -> String {
            let mut out = String::new();
            self.screen.read_to_string(&mut out).await.unwrap();
            out
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_patient_accepts_call() {
        let (mut rig, _stop, handle) = Rig::spawn(Role::Patient, "Hoşgeldiniz Hasta1");
        assert_eq!(rig.sent.recv().await.as_deref(), Some("Hasta"));

        rig.server.send("Hasta1 → Doktor1".into()).unwrap();
        rig.server.send(messages::call_prompt("Doktor1")).unwrap();
        rig.input.send("  evet ".into()).await.unwrap();
        assert_eq!(rig.sent.recv().await.as_deref(), Some("evet"));

        rig.server.send(messages::GET_WELL.into()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), Exit::GetWell);

        let screen = rig.screen_text().await;
        assert!(screen.contains("[Sunucu] Hoşgeldiniz Hasta1\n"));
        assert!(screen.contains("[Sunucu] Doktor1 tarafından çağrıldınız."));
        assert!(screen.ends_with("[Sunucu] Geçmiş olsun\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_to_zero() {
        let (rig, _stop, handle) = Rig::spawn(Role::Patient, "Hoşgeldiniz Hasta2");
        rig.server.send(messages::call_prompt("Doktor1")).unwrap();

        tokio::time::sleep(Duration::from_secs(12)).await;
        rig.server.send(messages::SHUTDOWN.into()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), Exit::Shutdown);

        let screen = rig.screen_text().await;
        let ticks: Vec<_> = screen
            .lines()
            .filter(|l| l.starts_with("[Sayaç]"))
            .collect();
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks[0], "[Sayaç] 10 saniye kaldı...");
        assert_eq!(ticks[9], "[Sayaç] 1 saniye kaldı...");
    }

    #[tokio::test]
    async fn test_doctor_input_checked_locally() {
        let (mut rig, _stop, handle) = Rig::spawn(Role::Doctor, "Hoşgeldiniz Doktor1");
        assert_eq!(rig.sent.recv().await.as_deref(), Some("Doktor"));

        rig.input.send("evet".into()).await.unwrap();
        rig.input.send("Hasta Kabul".into()).await.unwrap();
        assert_eq!(rig.sent.recv().await.as_deref(), Some("Hasta Kabul"));

        rig.server.send(messages::SHUTDOWN.into()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), Exit::Shutdown);
        assert!(rig.sent.try_recv().is_err());

        let screen = rig.screen_text().await;
        assert!(screen.contains(messages::INVALID_COMMAND));
    }

    #[tokio::test]
    async fn test_refused_registration() {
        let (rig, _stop, handle) = Rig::spawn(Role::Doctor, messages::CAPACITY_EXCEEDED);
        assert_eq!(
            handle.await.unwrap().unwrap(),
            Exit::Refused(messages::CAPACITY_EXCEEDED.into())
        );
        assert!(rig.screen_text().await.contains(messages::CAPACITY_EXCEEDED));
    }

    #[tokio::test]
    async fn test_server_close_and_input_close() {
        let (rig, _stop, handle) = Rig::spawn(Role::Patient, "Hoşgeldiniz Hasta1");
        drop(rig.server);
        assert_eq!(handle.await.unwrap().unwrap(), Exit::ServerClosed);

        let (rig, _stop, handle) = Rig::spawn(Role::Patient, "Hoşgeldiniz Hasta2");
        drop(rig.input);
        assert_eq!(handle.await.unwrap().unwrap(), Exit::InputClosed);
    }

    #[tokio::test]
    async fn test_interrupt() {
        let (mut rig, stop, handle) = Rig::spawn(Role::Patient, "Hoşgeldiniz Hasta1");
        assert_eq!(rig.sent.recv().await.as_deref(), Some("Hasta"));
        stop.send(()).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), Exit::Interrupted);
    }

    #[test]
    fn test_terminal_messages() {
        assert_eq!(terminal(messages::GET_WELL), Some(Exit::GetWell));
        assert_eq!(terminal(messages::SHUTDOWN), Some(Exit::Shutdown));
        assert_eq!(terminal(messages::NO_PATIENTS_WAITING), None);
    }
}
