/*!
Cursor Manager: regenerate telemetry identifiers and control the auto-updater
*/

use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};
use cursor_state::GateState;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::config::ManagerSettings;
use crate::core::orchestrator::{CommandResult, Orchestrator, Status};
use crate::core::system::{PrivilegeProbe, SystemPrivilege};

mod core;

#[derive(Debug, Clone, Copy)]
enum Action {
    Regenerate,
    Gate(GateState),
    Status,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ActionOutput {
    Command(CommandResult),
    Status(Status),
    Failed { message: String },
}

impl ActionOutput {
    fn ok(&self) -> bool {
        match self {
            ActionOutput::Command(result) => result.ok,
            ActionOutput::Status(_) => true,
            ActionOutput::Failed { .. } => false,
        }
    }
}

fn cli() -> Command {
    Command::new("Cursor Manager")
        .version("1.0.0")
        .about("Regenerates Cursor telemetry identifiers and toggles its auto-updater")
        .subcommand_required(true)
        .arg(
            Arg::new("settings")
                .short('s')
                .long("settings")
                .help("Path to a TOML settings file")
                .value_name("PATH")
                .global(true),
        )
        .arg(
            Arg::new("db-path")
                .short('p')
                .long("db-path")
                .help("Path to the operations audit database")
                .value_name("PATH")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the result as JSON")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("regenerate").about("Generate and record a fresh identifier set"))
        .subcommand(
            Command::new("gate")
                .about("Block or enable Cursor's auto-updater")
                .arg(
                    Arg::new("state")
                        .help("Target update state")
                        .value_parser(["block", "enable"])
                        .required(true),
                ),
        )
        .subcommand(Command::new("status").about("Show the update gate and operation history"))
}

fn parse_action(matches: &ArgMatches) -> Action {
    match matches.subcommand() {
        Some(("gate", sub)) => match sub.get_one::<String>("state").map(String::as_str) {
            Some("block") => Action::Gate(GateState::Blocked),
            _ => Action::Gate(GateState::Enabled),
        },
        Some(("status", _)) => Action::Status,
        _ => Action::Regenerate,
    }
}

/// Refuse before any store is opened, so an unprivileged regenerate touches no file
fn preflight(action: Action, privilege: &dyn PrivilegeProbe) -> Option<ActionOutput> {
    match action {
        Action::Regenerate if !privilege.is_privileged() => {
            Some(ActionOutput::Command(CommandResult::privilege_denied()))
        }
        _ => None,
    }
}

fn emit(output: &ActionOutput, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(output)?);
    } else {
        render(output);
    }
    Ok(())
}

fn run_action(orchestrator: Orchestrator, action: Action) -> ActionOutput {
    let output = match action {
        Action::Regenerate => ActionOutput::Command(orchestrator.regenerate_identifiers()),
        Action::Gate(target) => ActionOutput::Command(orchestrator.set_update_gate(target)),
        Action::Status => match orchestrator.get_status() {
            Ok(status) => ActionOutput::Status(status),
            Err(e) => ActionOutput::Failed {
                message: format!("❌ Could not read status: {}", e),
            },
        },
    };

    if let Err(e) = orchestrator.shutdown() {
        warn!("Audit store did not close cleanly: {}", e);
    }
    output
}

fn render(output: &ActionOutput) {
    match output {
        ActionOutput::Command(result) => {
            let color = if result.ok { "\x1b[32m" } else { "\x1b[31m" };
            println!("{}{}\x1b[0m", color, result.message);
            if let Some(ids) = &result.data {
                println!("Machine ID:     {}", ids.machine_id());
                println!("Mac Machine ID: {}", ids.mac_machine_id());
                println!("Device ID:      {}", ids.device_id());
                println!("SQM ID:         {}", ids.sqm_id());
            }
            if let Some(audit_error) = &result.audit_error {
                println!("\x1b[33m⚠️ Operation was not recorded: {}\x1b[0m", audit_error);
            }
        }
        ActionOutput::Status(status) => {
            let color = match status.gate_state {
                GateState::Enabled => "\x1b[32m",
                GateState::Blocked => "\x1b[31m",
            };
            println!("Updates: {}{}\x1b[0m", color, status.gate_state);
            match &status.last_operation {
                Some(op) => println!(
                    "Last operation: {} - {}",
                    op.operation,
                    op.timestamp.format("%Y-%m-%d %H:%M:%S")
                ),
                None => println!("Last operation: none yet"),
            }
            if status.identifier_history.is_empty() {
                println!("No identifiers have been regenerated yet.");
            } else {
                println!("Identifier history:");
                for op in &status.identifier_history {
                    println!("  {} - {}", op.operation, op.timestamp.format("%Y-%m-%d %H:%M:%S"));
                }
            }
        }
        ActionOutput::Failed { message } => {
            println!("\x1b[31m{}\x1b[0m", message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match matches.get_one::<String>("settings") {
        Some(path) => ManagerSettings::load(path)?,
        None => ManagerSettings::load_default()?,
    };
    if let Some(db_path) = matches.get_one::<String>("db-path") {
        settings.paths.audit_db = Some(PathBuf::from(db_path));
    }

    let action = parse_action(&matches);
    if let Some(refused) = preflight(action, &SystemPrivilege) {
        emit(&refused, matches.get_flag("json"))?;
        std::process::exit(1);
    }
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(match action {
        Action::Regenerate => "Regenerating identifiers...",
        Action::Gate(GateState::Blocked) => "Blocking updates...",
        Action::Gate(GateState::Enabled) => "Enabling updates...",
        Action::Status => "Reading status...",
    });
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut worker = tokio::task::spawn_blocking(move || run_action(orchestrator, action));
    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupt received, waiting for the current action to finish");
            worker.await
        }
    };
    spinner.finish_and_clear();

    let output = joined?;
    emit(&output, matches.get_flag("json"))?;

    if !output.ok() {
        std::process::exit(1);
    }
    Ok(())
}
