//! Command-line parsing for the `v8bridge` binary.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use v8bridge_core::{Handle, OutputFormat};
use v8bridge_protocol::ScriptId;

pub const USAGE: &str = "\
usage: v8bridge [--host H] [--port P] [--format xml|json] [--config FILE] <command>

commands:
  scripts               list loaded scripts
  backtrace             print the call stack
  source ID             print a script's source
  expand HANDLE         print an object's properties
  break SCRIPT_ID ROW   set a breakpoint at ROW of a script, or clear the one there
  continue              resume execution
  step-in | step-over | step-out
  suspend               pause execution
  watch                 print the call stack at every pause until Ctrl-C";

/// What to do once connected.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    Scripts,
    Backtrace,
    Source(ScriptId),
    Expand(Handle),
    Break { script_id: ScriptId, row: i64 },
    Continue,
    StepIn,
    StepOver,
    StepOut,
    Suspend,
    Watch,
}

/// Parsed command line. Unset options fall back to the loaded config.
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub format: Option<OutputFormat>,
    pub config: Option<PathBuf>,
    pub command: CliCommand,
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut host = None;
    let mut port = None;
    let mut format = None;
    let mut config = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => host = Some(value_for(&mut args, "--host")?),
            "--port" => {
                let raw = value_for(&mut args, "--port")?;
                port = Some(
                    raw.parse::<u16>()
                        .with_context(|| format!("invalid port '{raw}'"))?,
                );
            }
            "--format" => {
                let raw = value_for(&mut args, "--format")?;
                format = Some(raw.parse::<OutputFormat>().map_err(|e| anyhow!(e))?);
            }
            "--config" => config = Some(PathBuf::from(value_for(&mut args, "--config")?)),
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n{USAGE}"),
            _ => positional.push(arg),
        }
    }

    Ok(CliOptions {
        host,
        port,
        format,
        config,
        command: parse_command(&positional)?,
    })
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_command(words: &[String]) -> Result<CliCommand> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["scripts"] => CliCommand::Scripts,
        ["backtrace"] => CliCommand::Backtrace,
        ["source", id] => CliCommand::Source(parse_script_id(id)),
        ["expand", handle] => CliCommand::Expand(
            handle
                .parse()
                .with_context(|| format!("invalid handle '{handle}'"))?,
        ),
        ["break", id, row] => CliCommand::Break {
            script_id: parse_script_id(id),
            row: row
                .parse()
                .with_context(|| format!("invalid row '{row}'"))?,
        },
        ["continue"] => CliCommand::Continue,
        ["step-in"] => CliCommand::StepIn,
        ["step-over"] => CliCommand::StepOver,
        ["step-out"] => CliCommand::StepOut,
        ["suspend"] => CliCommand::Suspend,
        ["watch"] => CliCommand::Watch,
        [] => bail!("missing command\n{USAGE}"),
        other => bail!("unrecognized command '{}'\n{USAGE}", other.join(" ")),
    };
    Ok(command)
}

/// Numeric ids are sent as numbers, anything else as a string.
fn parse_script_id(raw: &str) -> ScriptId {
    raw.parse::<i64>()
        .map(ScriptId::Number)
        .unwrap_or_else(|_| ScriptId::Text(raw.to_string()))
}
