//! OpenAI Realtime API message types for transcription
//!
//! Wire format for the transcription-specific Realtime session. Final
//! fragments carry explicit item/previous-item linkage which is passed
//! through to the client verbatim - this provider supplies its own
//! ordering metadata.

use crate::protocol::SessionTuning;
use serde::{Deserialize, Serialize};

/// Default Realtime transcription model
pub const OPENAI_TRANSCRIBE_MODEL: &str = "gpt-4o-transcribe";

/// Messages sent to the Realtime API
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub(crate) enum RealtimeClientMessage {
    /// Session configuration, sent once the session exists
    #[serde(rename = "transcription_session.update")]
    TranscriptionSessionUpdate { session: RealtimeSessionConfig },
    /// Append one base64 audio frame to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    /// Commit the input buffer so trailing audio is transcribed
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
}

/// Realtime transcription session configuration
#[derive(Debug, Serialize)]
pub(crate) struct RealtimeSessionConfig {
    pub input_audio_format: String,
    pub input_audio_transcription: RealtimeTranscriptionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_noise_reduction: Option<RealtimeNoiseReduction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<RealtimeTurnDetection>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RealtimeTranscriptionConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RealtimeNoiseReduction {
    #[serde(rename = "type")]
    pub noise_type: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RealtimeTurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl RealtimeSessionConfig {
    /// Build the session update from client-supplied tuning, verbatim
    pub fn from_tuning(tuning: &SessionTuning) -> Self {
        Self {
            input_audio_format: "pcm16".to_string(),
            input_audio_transcription: RealtimeTranscriptionConfig {
                model: tuning
                    .model
                    .clone()
                    .unwrap_or_else(|| OPENAI_TRANSCRIBE_MODEL.to_string()),
                language: tuning.language.clone(),
            },
            input_audio_noise_reduction: tuning
                .noise_reduction
                .clone()
                .map(|noise_type| RealtimeNoiseReduction { noise_type }),
            turn_detection: Some(RealtimeTurnDetection {
                detection_type: "server_vad".to_string(),
                threshold: tuning.vad_threshold,
                prefix_padding_ms: tuning.prefix_padding_ms,
                silence_duration_ms: tuning.silence_duration_ms,
            }),
        }
    }
}

/// Messages received from the Realtime API
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum RealtimeServerEvent {
    /// Transcription session exists; configuration may now be sent
    #[serde(rename = "transcription_session.created")]
    TranscriptionSessionCreated {
        #[allow(dead_code)]
        session: Option<RealtimeSessionInfo>,
    },
    /// Configuration acknowledged
    #[serde(rename = "transcription_session.updated")]
    TranscriptionSessionUpdated {
        #[allow(dead_code)]
        session: Option<RealtimeSessionInfo>,
    },
    /// A speech chunk was committed; carries the ordering linkage
    #[serde(rename = "input_audio_buffer.committed")]
    InputAudioBufferCommitted {
        item_id: Option<String>,
        previous_item_id: Option<String>,
    },
    /// Partial transcription delta for one item
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta {
        item_id: Option<String>,
        delta: Option<String>,
    },
    /// Settled transcription for one item; replaces any partial text
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        item_id: Option<String>,
        transcript: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped,
    #[serde(rename = "error")]
    Error { error: Option<RealtimeError> },
    /// Catch-all for event types the adapter does not act on
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RealtimeSessionInfo {
    #[allow(dead_code)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RealtimeError {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub error_type: Option<String>,
    pub message: Option<String>,
}

impl RealtimeServerEvent {
    pub fn error_message(&self) -> Option<String> {
        match self {
            RealtimeServerEvent::Error { error } => {
                error.as_ref().and_then(|e| e.message.clone())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_serialization() {
        let msg = RealtimeClientMessage::TranscriptionSessionUpdate {
            session: RealtimeSessionConfig::from_tuning(&SessionTuning::default()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("transcription_session.update"));
        assert!(json.contains("gpt-4o-transcribe"));
        assert!(json.contains("pcm16"));
        assert!(json.contains("server_vad"));
        assert!(json.contains("near_field"));
    }

    #[test]
    fn test_tuning_model_override() {
        let tuning = SessionTuning {
            model: Some("whisper-1".to_string()),
            language: None,
            noise_reduction: None,
            ..SessionTuning::default()
        };
        let config = RealtimeSessionConfig::from_tuning(&tuning);
        assert_eq!(config.input_audio_transcription.model, "whisper-1");
        assert!(config.input_audio_transcription.language.is_none());
        assert!(config.input_audio_noise_reduction.is_none());
    }

    #[test]
    fn test_committed_deserialization_carries_linkage() {
        let json = r#"{"type":"input_audio_buffer.committed","item_id":"item_2","previous_item_id":"item_1"}"#;
        let event: RealtimeServerEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeServerEvent::InputAudioBufferCommitted {
                item_id,
                previous_item_id,
            } => {
                assert_eq!(item_id.as_deref(), Some("item_2"));
                assert_eq!(previous_item_id.as_deref(), Some("item_1"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_delta_deserialization() {
        let json = r#"{"type":"conversation.item.input_audio_transcription.delta","item_id":"item_1","delta":"hel"}"#;
        let event: RealtimeServerEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeServerEvent::TranscriptionDelta { item_id, delta } => {
                assert_eq!(item_id.as_deref(), Some("item_1"));
                assert_eq!(delta.as_deref(), Some("hel"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_completed_deserialization() {
        let json = r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"item_1","transcript":"Hello world"}"#;
        let event: RealtimeServerEvent = serde_json::from_str(json).unwrap();
        match event {
            RealtimeServerEvent::TranscriptionCompleted { item_id, transcript } => {
                assert_eq!(item_id.as_deref(), Some("item_1"));
                assert_eq!(transcript.as_deref(), Some("Hello world"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_unknown_event_tolerated() {
        let json = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let event: RealtimeServerEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, RealtimeServerEvent::Other));
    }

    #[test]
    fn test_error_message_extraction() {
        let json = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#;
        let event: RealtimeServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.error_message().as_deref(), Some("bad"));
    }
}
