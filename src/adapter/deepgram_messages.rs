//! Deepgram streaming API message types
//!
//! Deepgram configures the session through URL query parameters, takes raw
//! binary audio, and answers with JSON result events. Unlike the Realtime
//! protocol there is no item linkage - only interim/final flags per
//! utterance, in arrival order.

use crate::audio::TARGET_SAMPLE_RATE;
use crate::protocol::SessionTuning;
use serde::{Deserialize, Serialize};

/// Streaming recognizer endpoint
const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Default streaming model
pub const DEEPGRAM_MODEL: &str = "nova-3";

/// Control messages sent to Deepgram as JSON text frames
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub(crate) enum DeepgramClientMessage {
    /// Flush and close the stream gracefully
    CloseStream,
}

/// Messages received from Deepgram
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum DeepgramServerEvent {
    /// One recognition result, interim or final
    Results {
        channel: Option<DeepgramChannel>,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        speech_final: bool,
    },
    /// Silence window closed the current utterance
    UtteranceEnd,
    /// Session metadata, sent once after connecting
    Metadata {
        request_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeepgramChannel {
    #[serde(default)]
    pub alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeepgramAlternative {
    pub transcript: Option<String>,
}

impl DeepgramServerEvent {
    /// Best-alternative transcript text, if this is a non-empty result
    pub fn transcript(&self) -> Option<&str> {
        match self {
            DeepgramServerEvent::Results { channel, .. } => channel
                .as_ref()
                .and_then(|c| c.alternatives.first())
                .and_then(|a| a.transcript.as_deref())
                .filter(|t| !t.is_empty()),
            _ => None,
        }
    }
}

/// Build the listen URL with the session configuration as query parameters
///
/// Tuning values pass through verbatim; a missing language hint leaves the
/// parameter off so the provider auto-detects.
pub(crate) fn build_ws_url(tuning: &SessionTuning) -> Result<url::Url, url::ParseError> {
    let mut url = url::Url::parse(DEEPGRAM_LISTEN_URL)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(
            "model",
            tuning.model.as_deref().unwrap_or(DEEPGRAM_MODEL),
        );
        if let Some(language) = &tuning.language {
            query.append_pair("language", language);
        }
        query.append_pair("punctuate", "true");
        query.append_pair("interim_results", "true");
        query.append_pair("smart_format", "true");
        query.append_pair("encoding", "linear16");
        query.append_pair("sample_rate", &TARGET_SAMPLE_RATE.to_string());
        query.append_pair("channels", "1");
        query.append_pair("endpointing", &tuning.endpointing_ms.to_string());
        query.append_pair("utterance_end_ms", &tuning.utterance_end_ms.to_string());
    }
    Ok(url)
}
