//! Parley CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use parley::cli::{ChatArgs, Cli, Commands};
use parley::config::{
    ClientConfig, ConfigProvider, ConnectOptions, HttpConfigProvider, TokenProvider,
};
use parley::conversation::{MessageKind, MessageLog};
use parley::realtime::TurnDetection;
use parley::session::SessionOrchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Chat(chat_args) => handle_chat(chat_args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env();
    let mut options = ConnectOptions::model(args.model.clone());
    options.mode = args.mode;
    options.agent_id = args.agent_id.clone();
    options.agent_project_name = args.agent_project.clone();
    options.turn_detection = TurnDetection {
        kind: args.turn_detection,
        ..TurnDetection::default()
    };
    options.temperature = args.temperature;
    options.proactive = args.proactive;

    let mut token_provider: Option<Arc<dyn TokenProvider>> = None;
    if let Some(url) = &args.config_url {
        let provider = Arc::new(HttpConfigProvider::new(url.clone()));
        if let Some(remote) = provider.fetch().await? {
            config = config.merge_remote(&remote);
            if let Some(name) = &args.scenario {
                let scenario = remote
                    .scenario(name)
                    .ok_or_else(|| format!("Unknown scenario '{name}'"))?;
                options = options.with_scenario(scenario);
            }
            if remote.token.is_some() {
                token_provider = Some(provider as Arc<dyn TokenProvider>);
            }
        }
    }
    if let Some(instructions) = args.instructions {
        options.instructions = instructions;
    }

    let mut session = SessionOrchestrator::new(config, token_provider);
    let printer = tokio::spawn(print_log(session.log().clone()));

    if session.connect(options).await.is_err() {
        // The failure is already in the log.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        printer.abort();
        return Ok(());
    }
    eprintln!("Connected. Type a message, or /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if !session.state().is_connected() {
            eprintln!("Connection lost.");
            break;
        }
        // Send failures are rendered by the printer.
        let _ = session.send_text(line).await;
    }

    session.disconnect().await;
    printer.abort();
    Ok(())
}

/// Print new messages and streamed assistant text as the log changes.
async fn print_log(log: MessageLog) {
    let mut revisions = log.subscribe();
    let mut printed: Vec<usize> = Vec::new();
    loop {
        let messages = log.snapshot();
        let mut stdout = std::io::stdout();
        for (index, message) in messages.iter().enumerate() {
            match printed.get_mut(index) {
                Some(done) if *done < message.text.len() => {
                    let _ = write!(stdout, "{}", &message.text[*done..]);
                    *done = message.text.len();
                }
                Some(_) => {}
                None => {
                    let label = match message.kind {
                        MessageKind::User => "you",
                        MessageKind::Assistant => "assistant",
                        MessageKind::Status => "status",
                        MessageKind::Error => "error",
                    };
                    let _ = write!(stdout, "\n[{label}] {}", message.text);
                    printed.push(message.text.len());
                }
            }
        }
        let _ = stdout.flush();
        if revisions.changed().await.is_err() {
            break;
        }
    }
}
