mod cli;

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use v8bridge_config::logging::{ensure_log_dir, rotate_log_files};
use v8bridge_config::{load_config, AppPaths, Config, LogConfig, OutputFormatSetting};
use v8bridge_core::render::render_document;
use v8bridge_core::{
    BridgeOptions, ClientOptions, DebuggerBridge, DebuggerEvent, Document, DocumentModel,
    OutputFormat, PresentationSink, V8Client,
};

use crate::cli::{parse_args, CliCommand, CliOptions};

/// Send tracing output to the configured log file so it never mixes with
/// the documents printed on stdout.
fn init_logging(log: &LogConfig, paths: &AppPaths) -> Result<()> {
    let path = log.file.clone().unwrap_or_else(|| paths.default_log_file());
    ensure_log_dir(&path)
        .with_context(|| format!("failed to create log dir for {}", path.display()))?;
    rotate_log_files(&path, log.max_size_bytes, log.max_files)
        .with_context(|| format!("failed to rotate {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.as_filter()));
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load(opts: &CliOptions, paths: &AppPaths) -> Result<Config> {
    match &opts.config {
        Some(file) => v8bridge_config::load::load_file(file)
            .with_context(|| format!("failed to load {}", file.display())),
        None => {
            let project_dir = env::current_dir().ok();
            load_config(&paths.config_dir(), project_dir.as_deref())
                .context("failed to load configuration")
        }
    }
}

fn output_format(opts: &CliOptions, config: &Config) -> OutputFormat {
    opts.format.unwrap_or(match config.output.format {
        OutputFormatSetting::Xml => OutputFormat::Xml,
        OutputFormatSetting::Json => OutputFormat::Json,
    })
}

async fn run(opts: CliOptions) -> Result<()> {
    let paths = AppPaths::new().context("failed to detect home directory")?;
    let config = load(&opts, &paths)?;
    if let Err(e) = init_logging(&config.log, &paths) {
        eprintln!("v8bridge: logging disabled: {e:#}");
    }

    let host = opts.host.clone().unwrap_or_else(|| config.connection.host.clone());
    let port = opts.port.unwrap_or(config.connection.port);
    let format = output_format(&opts, &config);

    let client = V8Client::connect(
        &host,
        port,
        ClientOptions {
            request_timeout: config.connection.request_timeout(),
            ..Default::default()
        },
    )
    .await
    .with_context(|| format!("failed to connect to {host}:{port}"))?;

    let mut bridge = DebuggerBridge::new(
        Arc::new(client),
        BridgeOptions {
            excluded_prefixes: config.scripts.excluded_prefixes.clone(),
        },
    );
    let mut model = DocumentModel::new();

    match opts.command {
        CliCommand::Scripts => {
            let scripts = bridge.list_scripts().await?;
            model.load(Document::Sources(scripts));
        }
        CliCommand::Backtrace => {
            let frames = bridge.get_backtrace().await?;
            model.load(Document::Frames(frames));
        }
        CliCommand::Source(id) => {
            let source = bridge.load_script_source(&id).await?;
            print!("{source}");
            return Ok(());
        }
        CliCommand::Expand(handle) => {
            let items = bridge.expand_object(handle).await?;
            model.load(Document::Items(items));
        }
        CliCommand::Break { script_id, row } => {
            let scripts = bridge.list_scripts().await?;
            let script = scripts
                .iter()
                .find(|s| s.id == script_id)
                .with_context(|| format!("no script with id {script_id}"))?;
            // Each run starts with an empty table; take over what earlier
            // runs left in the debuggee so the toggle can clear it.
            let adopted = bridge.load_breakpoints(&scripts, &mut model).await?;
            info!(adopted, "existing breakpoints loaded");
            let toggle = bridge.toggle_breakpoint(script, row, &mut model).await?;
            info!(?toggle, "breakpoint toggled");
        }
        CliCommand::Continue => bridge.resume().await?,
        CliCommand::StepIn => bridge.step_into().await?,
        CliCommand::StepOver => bridge.step_over().await?,
        CliCommand::StepOut => bridge.step_out().await?,
        CliCommand::Suspend => bridge.suspend().await?,
        CliCommand::Watch => return watch(&mut bridge, &mut model, format).await,
    }

    let out = model.render(format)?;
    if !out.is_empty() {
        println!("{out}");
    }
    Ok(())
}

/// Print the call stack at every pause until interrupted, then detach.
/// Returns once the debuggee goes away; there is nothing left to detach
/// from in that case.
async fn watch(
    bridge: &mut DebuggerBridge<V8Client>,
    model: &mut DocumentModel,
    format: OutputFormat,
) -> Result<()> {
    let mut events = bridge.subscribe();
    info!(running = bridge.is_running(), "watching debuggee");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(DebuggerEvent::Break(pause)) => {
                    info!(line = ?pause.source_line, "paused");
                    match bridge.get_backtrace().await {
                        Ok(frames) => {
                            let doc = Document::Frames(frames);
                            println!("{}", render_document(&doc, format)?);
                            model.load(doc);
                        }
                        Err(e) => error!("backtrace failed: {e}"),
                    }
                }
                Ok(DebuggerEvent::ChangeRunning { running }) => {
                    info!(running, "running state changed");
                }
                Ok(DebuggerEvent::Disconnected) | Err(RecvError::Closed) => {
                    eprintln!("v8bridge: debuggee disconnected");
                    return Ok(());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed notifications"),
            },
        }
    }
    bridge.detach(model).await?;
    Ok(())
}

fn program_name(arg0: Option<String>) -> String {
    arg0.as_deref()
        .map(Path::new)
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "v8bridge".to_string())
}

#[tokio::main]
async fn main() {
    let mut args = env::args();
    let name = program_name(args.next());

    let result = match parse_args(args) {
        Ok(opts) => run(opts).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("{name}: {e:#}");
        std::process::exit(1);
    }
}
