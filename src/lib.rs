//! Handset Assistant - a telephone handset voice kiosk
//!
//! Lifting the receiver wakes the kiosk; each spoken request is answered by
//! a streamed reply that starts playing before generation has finished.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Hardware                          │
//! │   Hookswitch  │  Keypad  │  Console stand-in         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Kiosk                           │
//! │   Wake  │  Listen (mic + STT)  │  Conversation log   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ request
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Pipeline                          │
//! │   Generation  ─▶  Synthesis  ─▶  Playback            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod conversation_log;
pub mod error;
pub mod hardware;
pub mod kiosk;
pub mod llm;
pub mod pipeline;
pub mod voice;

pub use config::Config;
pub use conversation_log::ConversationLog;
pub use error::{Error, Outcome, Result};
pub use kiosk::{Kiosk, Turn};
pub use pipeline::{Orchestrator, PipelineReport, PipelineSettings};
