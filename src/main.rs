//! gpio-bridge - Supervised GPIO worker over a JSON-line or HTTP channel.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpio_bridge::config::{BackendKind, BridgeConfig, ConfigLoader, ConfigError, TransportKind};
use gpio_bridge::display;
use gpio_bridge::supervisor::{ClientConfig, ClientError, SupervisorClient};
use gpio_bridge::worker::{self, SideChannel};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransportArg {
    Stdio,
    Http,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Stdio => TransportKind::Stdio,
            TransportArg::Http => TransportKind::Http,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Simulated,
    Sysfs,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Simulated => BackendKind::Simulated,
            BackendArg::Sysfs => BackendKind::Sysfs,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "gpio-bridge",
    about = "Drive GPIO pins through a supervised worker process",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: .gpio-bridge.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the client commands.
#[derive(Args, Debug, Clone)]
struct ClientArgs {
    /// Transport between client and worker.
    #[arg(long, value_enum)]
    transport: Option<TransportArg>,
    /// GPIO backend the worker uses.
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
    /// Worker executable (default: this binary).
    #[arg(long)]
    worker: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the GPIO worker (normally launched by the client).
    Worker {
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Root of the sysfs GPIO class directory.
        #[arg(long)]
        sysfs_root: Option<PathBuf>,
        /// First HTTP port to probe; 0 lets the OS choose.
        #[arg(long)]
        port: Option<u16>,
        /// Number of ports to probe.
        #[arg(long)]
        port_attempts: Option<u16>,
        /// Write worker logs to this file.
        #[arg(long)]
        log_file: Option<PathBuf>,
        /// HTTP transport: stop when stdin reaches EOF.
        #[arg(long)]
        exit_on_stdin_eof: bool,
    },
    /// Set a pin high or low.
    Set {
        /// BCM pin number.
        pin: i64,
        /// high, low, on, off, 1, 0, true or false.
        state: String,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Read a pin.
    Read {
        /// BCM pin number.
        pin: i64,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Show claimed pins.
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// List usable pins.
    Pins {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// List the worker's tools.
    Tools {
        #[command(flatten)]
        client: ClientArgs,
    },
}

/// One client request.
#[derive(Debug)]
enum ClientCommand {
    Set { pin: i64, state: String },
    Read { pin: i64 },
    Status,
    Pins,
    Tools,
}

fn env_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn init_tracing(verbosity: u8) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(verbosity))
        .init();
}

/// The worker's stdout and stderr are protocol channels, so it only logs
/// to a file.
fn init_worker_tracing(verbosity: u8, log_file: Option<&Path>) -> std::io::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(env_filter(verbosity.max(1)))
        .init();
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::load_from_path(&path),
        None => ConfigLoader::new().load(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            display::print_failure(&e.to_string());
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Worker {
            transport,
            backend,
            sysfs_root,
            port,
            port_attempts,
            log_file,
            exit_on_stdin_eof,
        } => {
            let mut settings = config.worker;
            if let Some(backend) = backend {
                settings.backend = backend.into();
            }
            if let Some(root) = sysfs_root {
                settings.sysfs_root = root;
            }
            if let Some(port) = port {
                settings.port_range_start = port;
            }
            if let Some(attempts) = port_attempts {
                settings.port_attempts = attempts;
            }
            if log_file.is_some() {
                settings.log_file = log_file;
            }
            settings.exit_on_stdin_eof |= exit_on_stdin_eof;
            let transport = transport.map_or(config.client.transport, Into::into);

            if let Err(e) = init_worker_tracing(cli.verbose, settings.log_file.as_deref()) {
                let _ = SideChannel::new(std::io::stderr())
                    .error(&format!("Cannot open log file: {e}"));
                std::process::exit(1);
            }

            match worker::run(&settings, transport).await {
                Ok(()) => 0,
                Err(_) => 1,
            }
        }
        Commands::Set { pin, state, client } => {
            run_client(config, client, ClientCommand::Set { pin, state }, cli.verbose).await
        }
        Commands::Read { pin, client } => {
            run_client(config, client, ClientCommand::Read { pin }, cli.verbose).await
        }
        Commands::Status { client } => {
            run_client(config, client, ClientCommand::Status, cli.verbose).await
        }
        Commands::Pins { client } => {
            run_client(config, client, ClientCommand::Pins, cli.verbose).await
        }
        Commands::Tools { client } => {
            run_client(config, client, ClientCommand::Tools, cli.verbose).await
        }
    };

    // Exit explicitly: the worker's stdin reader may still be parked on a
    // blocking read, which would hold the runtime open.
    std::process::exit(code);
}

async fn run_client(
    mut config: BridgeConfig,
    args: ClientArgs,
    command: ClientCommand,
    verbosity: u8,
) -> i32 {
    init_tracing(verbosity);

    if let Some(transport) = args.transport {
        config.client.transport = transport.into();
    }
    if let Some(backend) = args.backend {
        config.worker.backend = backend.into();
    }
    if args.worker.is_some() {
        config.client.worker_program = args.worker;
    }

    let client_config = match ClientConfig::from_config(&config) {
        Ok(client_config) => client_config,
        Err(e) => {
            display::print_failure(&e.to_string());
            return 1;
        }
    };

    tracing::info!(command = ?command, transport = %client_config.transport, "Running client command");
    let json = args.json;
    let result = SupervisorClient::scoped(client_config, move |client| {
        Box::pin(async move { execute(client, command, json).await })
    })
    .await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            display::print_error(&e);
            1
        }
    }
}

async fn execute(
    client: &mut SupervisorClient,
    command: ClientCommand,
    json: bool,
) -> Result<(), ClientError> {
    match command {
        ClientCommand::Set { pin, state } => {
            let result = client.set_pin(pin, &state).await?;
            if json {
                display::print_json(&result);
            } else {
                display::print_pin_result(&result);
            }
        }
        ClientCommand::Read { pin } => {
            let result = client.read_pin(pin).await?;
            if json {
                display::print_json(&result);
            } else {
                display::print_pin_result(&result);
            }
        }
        ClientCommand::Status => {
            let status = client.get_status().await?;
            if json {
                display::print_json(&status);
            } else {
                display::print_status(&status);
            }
        }
        ClientCommand::Pins => {
            let pins = client.list_valid_pins().await?;
            if json {
                display::print_json(&pins);
            } else {
                display::print_valid_pins(&pins);
            }
        }
        ClientCommand::Tools => {
            let tools = client.list_tools().await?;
            if json {
                display::print_json(&tools);
            } else {
                display::print_tools(&tools);
            }
        }
    }
    Ok(())
}
