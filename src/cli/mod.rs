//! CLI entry point for Parley.

use clap::{Parser, Subcommand};

use crate::config::{ConnectionMode, DEFAULT_MODEL};
use crate::realtime::TurnDetectionKind;

/// Parley realtime conversation CLI
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Parley realtime conversation CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hold a text conversation with a realtime model or agent
    Chat(ChatArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Connect to a model or to a hosted agent
    #[arg(long, default_value_t = ConnectionMode::Model)]
    pub mode: ConnectionMode,

    /// Realtime model name (model mode)
    #[arg(short, long, env = "AZURE_VOICE_LIVE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Agent id (agent mode)
    #[arg(long, env = "AZURE_VOICE_LIVE_AGENT_ID")]
    pub agent_id: Option<String>,

    /// Agent project name (agent mode)
    #[arg(long, env = "AZURE_VOICE_LIVE_AGENT_PROJECT")]
    pub agent_project: Option<String>,

    /// System instructions
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Base URL of a configuration service serving `/config`
    #[arg(long)]
    pub config_url: Option<String>,

    /// Predefined scenario from the configuration service
    #[arg(long, requires = "config_url")]
    pub scenario: Option<String>,

    /// Turn detection (server_vad, azure_semantic_vad, disabled)
    #[arg(long, default_value_t = TurnDetectionKind::ServerVad)]
    pub turn_detection: TurnDetectionKind,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Let the model greet and nudge when the conversation goes quiet
    #[arg(long)]
    pub proactive: bool,
}
