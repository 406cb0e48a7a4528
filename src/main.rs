mod connection;
mod transport;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use clinic_shared::{limits, Role};
use connection::{ClientSession, Exit};
use tokio::sync::mpsc;
use transport::{TcpConnector, TransportConnector, UdpConnector};

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    #[value(name = "Doktor")]
    Doktor,
    #[value(name = "Hasta")]
    Hasta,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Doktor => Role::Doctor,
            RoleArg::Hasta => Role::Patient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportArg {
    #[value(name = "TCP")]
    Tcp,
    #[value(name = "UDP")]
    Udp,
}

#[derive(Parser, Debug)]
#[command(name = "clinic-client")]
#[command(version, about = "Hospital appointment client", long_about = None)]
struct Args {
    /// Who is connecting
    #[arg(value_enum, ignore_case = true)]
    role: RoleArg,

    /// Transport to the dispatcher
    #[arg(value_enum, ignore_case = true)]
    transport: TransportArg,

    /// Dispatcher host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Dispatcher port
    #[arg(short, long, default_value_t = limits::DEFAULT_PORT)]
    port: u16,
}

impl Args {
    /// Pick the connector, enforcing that doctors only use TCP
    fn connector(&self) -> anyhow::Result<Box<dyn TransportConnector>> {
        let address = format!("{}:{}", self.host, self.port);
        match (self.role, self.transport) {
            (RoleArg::Doktor, TransportArg::Udp) => {
                bail!("Doktorlar sadece TCP ile bağlanabilir.")
            }
            (_, TransportArg::Tcp) => Ok(Box::new(TcpConnector::new(address))),
            (_, TransportArg::Udp) => Ok(Box::new(UdpConnector::new(address))),
        }
    }
}

/// Feed console lines into a channel from a plain thread
///
/// A detached thread does not hold the runtime open at exit.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// `RUST_LOG` directives when set and valid, `info` otherwise
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let args = Args::parse();
    let connector = args.connector()?;
    let role = Role::from(args.role);

    info!(%role, transport = connector.name(), host = %args.host, port = args.port, "Connecting");
    let pair = match connector.connect().await {
        Ok(pair) => pair,
        Err(e) => {
            error!("Bağlantı hatası: {}", e);
            return Err(e);
        }
    };

    let session = ClientSession::new(role, pair, tokio::io::stdout());
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match session.run(spawn_stdin_reader(), interrupt).await? {
        Exit::Refused(reason) => bail!("registration refused: {}", reason),
        _ => Ok(()),
    }
}
