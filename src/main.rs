use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use srunx::config::{ClientConfig, TlsConfig};
use srunx::error::Result;
use srunx::interrupt::{install_interrupt_handler, InterruptContext};
use srunx::resource::{parse_memory, parse_time_limit, ResourceDescriptor};
use srunx::session::Session;
use srunx::shutdown::install_shutdown_handler;
use srunx::task::RemoteCommand;

#[derive(Parser, Debug)]
#[command(name = "srunx")]
#[command(version)]
#[command(about = "Run an interactive task on a SlurmX cluster")]
struct Args {
    /// Control daemon address (host:port, or a URI with scheme)
    #[arg(long, short = 's', default_value = "127.0.0.1:50051")]
    server: String,

    /// Partition to allocate from
    #[arg(long, short = 'p')]
    partition: String,

    /// Number of CPU cores
    #[arg(long, short = 'c')]
    cpus: u32,

    /// Memory limit (e.g. 512M, 4G)
    #[arg(long, short = 'm', value_parser = parse_memory)]
    memory: u64,

    /// Time limit (seconds, MM:SS or HH:MM:SS)
    #[arg(long, short = 't', value_parser = parse_time_limit)]
    time: u64,

    /// Delay between allocation detail queries, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval_ms: u64,

    /// Give up after this many allocation detail queries
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Give up waiting for an allocation after this many seconds
    #[arg(long)]
    poll_timeout_secs: Option<u64>,

    /// Enable TLS for daemon connections
    #[arg(long)]
    tls: bool,

    /// Path to CA certificate (PEM format)
    #[arg(long, requires = "tls")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (PEM format)
    #[arg(long, requires = "tls")]
    cert: Option<PathBuf>,

    /// Path to client private key (PEM format)
    #[arg(long, requires = "tls")]
    key: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Executable to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.server.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));
        if let Some(attempts) = self.max_poll_attempts {
            config = config.with_max_poll_attempts(attempts);
        }
        if let Some(secs) = self.poll_timeout_secs {
            config = config.with_poll_timeout(Duration::from_secs(secs));
        }
        config.tls = TlsConfig {
            enabled: self.tls,
            ca_cert_path: self.ca_cert.clone(),
            cert_path: self.cert.clone(),
            key_path: self.key.clone(),
            ..TlsConfig::default()
        };
        config
    }
}

async fn run(args: Args) -> Result<bool> {
    let resource = ResourceDescriptor::new(args.partition.clone(), args.cpus, args.memory)?;
    let command = RemoteCommand::from_argv(args.command.iter().cloned())?;

    let shutdown = install_shutdown_handler()?;
    // Ctrl+C never kills the client; it is only ever forwarded to a running task.
    let interrupts = InterruptContext::new();
    let _sigint = install_interrupt_handler(interrupts.clone())?;

    let session = Session::new(args.client_config(), shutdown).await?;
    let (task_id, detail) = session.acquire(&resource, args.time).await?;

    let outcome = session
        .execute(tokio::io::stdout(), interrupts, task_id, &detail, &command)
        .await;
    Ok(outcome.is_success())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "srunx failed");
            ExitCode::FAILURE
        }
    }
}
