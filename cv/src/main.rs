//! Canvass - ask-and-collect query coordination
//!
//! CLI entry point for running scripted sessions and inspecting configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::info;

use canvass::cli::{Cli, Command, OutputFormat};
use canvass::config::Config;
use canvass::query::UserStatus;
use canvass::sim::{SimulationPlan, SimulationReport, run_simulation};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("canvass")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Log to file so report output stays clean
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("canvass.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(
        "Canvass loaded config: channel_capacity={}, query_ttl={:?}",
        config.transport.channel_capacity, config.coordinator.query_ttl_secs
    );

    match cli.command {
        Some(Command::Simulate {
            users,
            question,
            id,
            answers,
            absent,
            drop,
            observe,
            format,
        }) => {
            let plan = SimulationPlan {
                query_id: id,
                question,
                users,
                answers: answers.into_iter().collect::<BTreeMap<_, _>>(),
                absent,
                drop,
                observe,
            };
            cmd_simulate(&config, plan, format).await
        }
        Some(Command::Config { format }) => cmd_config(&config, format),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Run one scripted session and print what happened
async fn cmd_simulate(config: &Config, plan: SimulationPlan, format: OutputFormat) -> Result<()> {
    let report = run_simulation(config, plan).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!("{} {}", "Query".bright_cyan().bold(), report.query_id.bold());
    println!("  {}", report.question.dimmed());
    println!();

    match &report.responses {
        Some(responses) if responses.is_empty() => println!("{}", "No responses".yellow()),
        Some(responses) => {
            println!("{}", "Responses".bold());
            for (user, answer) in responses {
                let rolls = report
                    .rolls
                    .get(user)
                    .map(|r| r.iter().map(u32::to_string).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                println!("  {:12} {:10} {}", user.yellow(), display_value(answer), rolls.dimmed());
            }
        }
        None => println!("{}", "Query was cancelled".red()),
    }

    if let Some(status) = &report.final_status {
        println!();
        println!("{}", "Status".bold());
        for user in &status.users {
            let label = match user.status {
                UserStatus::Finished => user.status.to_string().green(),
                UserStatus::Waiting => user.status.to_string().yellow(),
                UserStatus::Disconnected => user.status.to_string().red(),
                UserStatus::Unprompted => user.status.to_string().dimmed(),
            };
            println!("  {:12} {}", user.name, label);
        }
    }

    if !report.errors.is_empty() {
        println!();
        for error in &report.errors {
            println!("{} {}", "!".red(), error);
        }
    }

    let metrics = &report.metrics;
    println!();
    println!(
        "{}",
        format!(
            "sent {} / received {} / dropped {}",
            metrics.messages_sent, metrics.messages_received, metrics.dropped_messages
        )
        .dimmed()
    );
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Yaml | OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}
