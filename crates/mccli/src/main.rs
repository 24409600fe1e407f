//! mccli: command line client for MeshCore companion devices.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use mccli::chat::{ChatSession, LineAction};
use mccli::error::{CommandError, SessionError};
use mccli::format::{render, OutputMode};
use mccli::pipeline::{ChainStatus, Pipeline};
use mccli::repl;
use mccli::session::{DeviceSession, Endpoint, MeshSession};
use mccli::settings::{Settings, StateDir};
use mccli::wait::WaitCoordinator;

/// Interactive shell and batch command runner for MeshCore companion devices.
#[derive(Parser, Debug)]
#[command(name = "mccli", version, about)]
struct Args {
    /// Bluetooth address of the device
    #[arg(short = 'a', long)]
    address: Option<String>,

    /// Bluetooth name filter
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// TCP host of a companion bridge
    #[arg(short = 't', long)]
    host: Option<String>,

    /// TCP port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Serial port path
    #[arg(short = 's', long)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(short = 'b', long)]
    baud: Option<u32>,

    /// Print every record as one JSON object per line
    #[arg(short = 'j', long)]
    json: bool,

    /// Run the lines of a file as if typed at the prompt
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Settings file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Commands to run; interactive mode when empty
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

impl Args {
    /// Endpoint named on the command line, merged with file defaults.
    fn endpoint(&self, settings: &Settings) -> Option<Endpoint> {
        let connection = &settings.connection;
        if let Some(path) = &self.serial {
            return Some(Endpoint::Serial {
                path: path.clone(),
                baud: self.baud.unwrap_or(connection.baud),
            });
        }
        if let Some(host) = &self.host {
            return Some(Endpoint::Tcp {
                host: host.clone(),
                port: self.port.unwrap_or(connection.port),
            });
        }
        if let Some(target) = self.address.as_ref().or(self.device.as_ref()) {
            return Some(Endpoint::Ble {
                target: target.clone(),
            });
        }
        None
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings_path = args.config.clone().or_else(Settings::default_path);
    let settings = match &settings_path {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };
    let state = StateDir::for_settings(settings_path.as_deref());

    let Some(endpoint) = args
        .endpoint(&settings)
        .or_else(|| settings.connection.endpoint())
        .or_else(|| state.as_ref().and_then(StateDir::last_endpoint))
    else {
        eprintln!("no device given: use --host, --serial or a settings file");
        return ExitCode::FAILURE;
    };

    let session = match connect(&endpoint, &settings).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("cannot connect to {}: {}", endpoint, e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(state) = &state {
        if let Err(e) = state.remember_endpoint(&endpoint) {
            warn!("{}", e);
        }
    }

    let session: Arc<dyn DeviceSession> = Arc::new(session);
    let Some(events) = session.take_events() else {
        eprintln!("push feed already taken");
        return ExitCode::FAILURE;
    };
    let waits = WaitCoordinator::new(events);
    let pipeline = Pipeline::new(session, waits.clone(), settings.pipeline_options());
    repl::install_interrupt_handler(pipeline.interrupt(), waits);

    let mode = if args.json || settings.output.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    if let Some(file) = &args.file {
        return run_file(pipeline, mode, file).await;
    }
    if !args.commands.is_empty() {
        return run_batch(pipeline, mode, &args.commands).await;
    }

    let history = state.as_ref().map(StateDir::history_path);
    repl::run(ChatSession::new(pipeline, mode), history).await;
    ExitCode::SUCCESS
}

async fn connect(endpoint: &Endpoint, settings: &Settings) -> Result<MeshSession, SessionError> {
    debug!(%endpoint, "connecting");
    let link = endpoint.open().await?;
    MeshSession::connect(link, settings.request_timeout()).await
}

async fn run_batch(mut pipeline: Pipeline, mode: OutputMode, commands: &[String]) -> ExitCode {
    let status = pipeline
        .run_streaming(commands, &mut |record| println!("{}", render(&record, mode)))
        .await;
    match status {
        ChainStatus::Completed => ExitCode::SUCCESS,
        ChainStatus::Aborted(CommandError::Cancelled) => ExitCode::from(130),
        ChainStatus::Aborted(_) => ExitCode::FAILURE,
    }
}

async fn run_file(pipeline: Pipeline, mode: OutputMode, file: &Path) -> ExitCode {
    let text = match tokio::fs::read_to_string(file).await {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}: {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut chat = ChatSession::new(pipeline, mode);
    let mut print = |text: String| println!("{}", text);
    for line in text.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        if chat.handle_line(line, &mut print).await == LineAction::Quit {
            break;
        }
        if chat.pipeline().interrupt().is_set() {
            return ExitCode::from(130);
        }
    }
    ExitCode::SUCCESS
}
