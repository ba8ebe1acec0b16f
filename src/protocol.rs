//! Client-facing wire protocol
//!
//! JSON messages exchanged with the editor client over the persistent
//! WebSocket connection, plus the session tuning block that is handed to
//! the chosen provider adapter verbatim. The relay never interprets the
//! tuning values.

use crate::transcript::TranscriptFragment;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream transcription provider a session talks to
///
/// Selected once at `init` and never swapped mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// OpenAI Realtime transcription (explicit item/previous-item linkage)
    #[default]
    Classic,
    /// Deepgram streaming transcription (interim/final, no linkage)
    Pro,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderMode::Classic => write!(f, "classic"),
            ProviderMode::Pro => write!(f, "pro"),
        }
    }
}

/// Session configuration forwarded to the provider unmodified
///
/// Defaults mirror the deployed service: English hint, server VAD tuned
/// for fast turn detection, near-field noise reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    /// Language hint; `None` lets the provider auto-detect
    pub language: Option<String>,
    /// Transcription model override
    pub model: Option<String>,
    /// VAD speech threshold (0.0-1.0)
    pub vad_threshold: f32,
    /// Audio included before detected speech (ms)
    pub prefix_padding_ms: u32,
    /// Silence marking end of a turn (ms)
    pub silence_duration_ms: u32,
    /// Endpointing window for streaming finals (ms)
    pub endpointing_ms: u32,
    /// Silence window closing an utterance (ms)
    pub utterance_end_ms: u32,
    /// Noise reduction hint ("near_field" or "far_field")
    pub noise_reduction: Option<String>,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            language: Some("en".to_string()),
            model: None,
            vad_threshold: 0.6,
            prefix_padding_ms: 200,
            silence_duration_ms: 400,
            endpointing_ms: 10,
            utterance_end_ms: 1000,
            noise_reduction: Some("near_field".to_string()),
        }
    }
}

/// Messages received from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a mode-specific transcription session
    Init {
        #[serde(default)]
        mode: ProviderMode,
        /// Optional tuning override, passed through to the provider
        #[serde(default)]
        session: Option<SessionTuning>,
    },
    /// One base64-encoded PCM16 audio frame
    Audio { audio: String },
    /// End the session
    Stop,
}

/// Messages sent to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Upstream connection established; audio will now be forwarded
    Ready,
    /// Session-fatal failure (missing credentials, upstream error)
    Error { message: String },
    /// Upstream connection closed
    Disconnected { message: String },
    /// One normalized transcript fragment
    Fragment {
        #[serde(flatten)]
        fragment: TranscriptFragment,
    },
    /// Provider VAD detected start of speech
    SpeechStarted,
    /// Provider VAD detected end of speech
    SpeechStopped,
}
