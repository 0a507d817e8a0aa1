//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// Canvass - ask-and-collect over a broadcast channel
#[derive(Parser)]
#[command(
    name = "canvass",
    about = "Ask-and-collect query coordination over a broadcast-only channel",
    version,
    after_help = "Logs are written to: ~/.local/share/canvass/logs/canvass.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run one query through an in-process session of scripted peers
    Simulate {
        /// Responders, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        users: Vec<String>,

        /// Question asked; also used to derive the answer key
        #[arg(short, long, default_value = "Stat Base")]
        question: String,

        /// Query id
        #[arg(long)]
        id: Option<String>,

        /// Scripted answer as USER=VALUE; responders without one decline
        #[arg(short, long = "answer", value_name = "USER=VALUE", value_parser = parse_answer)]
        answers: Vec<(String, Value)>,

        /// Responders that never connect
        #[arg(long, value_delimiter = ',')]
        absent: Vec<String>,

        /// Responders that disconnect once prompted
        #[arg(long, value_delimiter = ',')]
        drop: Vec<String>,

        /// Attach a status view and print it
        #[arg(long)]
        observe: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "yaml")]
        format: OutputFormat,
    },
}

/// Parse `user=value`; the value is read as JSON when it parses, else as a string
pub fn parse_answer(s: &str) -> Result<(String, Value), String> {
    let (user, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid answer '{}': expected USER=VALUE", s))?;
    let user = user.trim();
    if user.is_empty() {
        return Err(format!("Invalid answer '{}': missing user", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((user.to_string(), value))
}

/// Output format for reports
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(format!("Unknown format: {}. Use: text, json, or yaml", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}
