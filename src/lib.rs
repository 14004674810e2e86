//! Parley: realtime duplex text and speech conversations
//!
//! Connects to a realtime conversational service over WebSocket, streams
//! assistant text and audio into an observable message log, answers tool
//! calls, forwards microphone audio, optionally negotiates avatar video, and
//! can inject proactive turns when the conversation goes quiet.
//!
//! # Quick Start
//!
//! ```no_run
//! use parley::config::{ClientConfig, ConnectOptions};
//! use parley::session::SessionOrchestrator;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let mut session = SessionOrchestrator::new(ClientConfig::from_env(), None);
//! session.connect(ConnectOptions::model("gpt-4o-realtime-preview")).await?;
//! session.send_text("Hello!").await?;
//! for message in session.log().snapshot() {
//!     println!("[{}] {}", message.kind, message.text);
//! }
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod audio;
pub mod avatar;
pub mod config;
pub mod conversation;
pub mod error;
pub mod lookup;
pub mod processor;
pub mod realtime;
pub mod session;
pub mod tools;

#[cfg(feature = "cli")]
pub mod cli;
