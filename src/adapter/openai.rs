//! OpenAI Realtime adapter (classic mode)
//!
//! Speaks the Realtime transcription protocol: JSON text frames both ways,
//! audio as base64 `input_audio_buffer.append` messages. This provider
//! attaches explicit item/previous-item linkage to committed speech chunks,
//! so fragments pass through with their ordering metadata untouched.

use super::openai_messages::{
    RealtimeClientMessage, RealtimeServerEvent, RealtimeSessionConfig,
};
use super::{AdapterEvent, AdapterHandle, AdapterLink};
use crate::audio::AudioFrame;
use crate::error::{RelayError, WS_CONNECT_TIMEOUT_SECS};
use crate::protocol::SessionTuning;
use crate::transcript::TranscriptFragment;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

/// Realtime WebSocket URL for transcription sessions
const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";

/// Ping interval to keep the upstream connection alive
const PING_INTERVAL_SECS: u64 = 30;

/// Spawn the adapter; configuration failures surface as events
pub(super) fn spawn(api_key: Option<String>, tuning: SessionTuning) -> AdapterHandle {
    let (handle, link) = AdapterHandle::pair();
    tokio::spawn(run(api_key, tuning, link));
    handle
}

async fn run(api_key: Option<String>, tuning: SessionTuning, link: AdapterLink) {
    let AdapterLink {
        audio_rx,
        events,
        stop_rx,
    } = link;

    let Some(api_key) = api_key.filter(|key| !key.is_empty()) else {
        let _ = events
            .send(AdapterEvent::Error {
                message: RelayError::Config("OpenAI API key not configured".to_string())
                    .to_string(),
            })
            .await;
        let _ = events.send(AdapterEvent::Closed).await;
        return;
    };

    let request = match build_ws_request(&api_key) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to build OpenAI WebSocket request: {}", e);
            let _ = events.send(AdapterEvent::Error { message: e }).await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
    };

    info!("Connecting to OpenAI Realtime for STT");
    let ws_stream = match timeout(
        Duration::from_secs(WS_CONNECT_TIMEOUT_SECS),
        connect_async(request),
    )
    .await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            error!("OpenAI WebSocket connection failed: {}", e);
            let _ = events
                .send(AdapterEvent::Error {
                    message: RelayError::Upstream(format!("OpenAI connection error: {}", e))
                        .to_string(),
                })
                .await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
        Err(_) => {
            error!("OpenAI WebSocket connection timed out");
            let _ = events
                .send(AdapterEvent::Error {
                    message: RelayError::Upstream("OpenAI connection timed out".to_string())
                        .to_string(),
                })
                .await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
    };
    info!("Connected to OpenAI Realtime");

    let (ws_sink, ws_reader) = ws_stream.split();

    // Control messages from the receive loop to the sink task (the session
    // update can only go out after the provider announces the session)
    let (control_tx, control_rx) = mpsc::channel::<Message>(8);

    let send_task = tokio::spawn(run_send_task(
        ws_sink,
        audio_rx,
        control_rx,
        stop_rx.clone(),
    ));

    run_receive_loop(ws_reader, &events, &control_tx, stop_rx, &tuning).await;

    let _ = send_task.await;
    let _ = events.send(AdapterEvent::Closed).await;
}

/// Build the upstream request with Bearer auth and the Realtime beta header
fn build_ws_request(api_key: &str) -> Result<http::Request<()>, String> {
    http::Request::builder()
        .uri(OPENAI_REALTIME_URL)
        .header("Host", "api.openai.com")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("OpenAI-Beta", "realtime=v1")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", super::helpers::generate_ws_key())
        .header("Sec-WebSocket-Version", "13")
        .body(())
        .map_err(|e| e.to_string())
}

/// Drain audio frames and control messages into the upstream sink
///
/// On teardown, commits the input buffer before closing so trailing audio
/// still produces a final transcription.
async fn run_send_task<S>(
    mut ws_sink: S,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    mut control_rx: mpsc::Receiver<Message>,
    mut stop_rx: watch::Receiver<bool>,
) where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let base64_engine = base64::engine::general_purpose::STANDARD;
    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut frames_sent = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                debug!("OpenAI send task stopping after {} frames", frames_sent);
                if let Err(e) = send_commit(&mut ws_sink).await {
                    warn!("Failed to send OpenAI commit: {}", e);
                }
                break;
            }
            msg = control_rx.recv() => {
                if let Some(msg) = msg {
                    if ws_sink.send(msg).await.is_err() {
                        warn!("OpenAI control message send failed");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if ws_sink.send(Message::Ping(vec![])).await.is_err() {
                    warn!("Failed to send OpenAI keepalive ping");
                    break;
                }
                trace!("Sent OpenAI keepalive ping");
            }
            frame = audio_rx.recv() => {
                match frame {
                    Some(frame) => {
                        frames_sent += 1;
                        if frames_sent == 1 || frames_sent % 100 == 0 {
                            trace!(
                                "OpenAI send task: frame #{}, {:.1}ms",
                                frames_sent,
                                frame.duration_ms()
                            );
                        }
                        let audio = base64_engine.encode(frame.pcm_bytes());
                        let msg = RealtimeClientMessage::InputAudioBufferAppend { audio };
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if ws_sink.send(Message::Text(json)).await.is_err() {
                                    error!("Failed to send OpenAI audio frame");
                                    break;
                                }
                            }
                            Err(e) => error!("Failed to serialize audio append: {}", e),
                        }
                    }
                    None => {
                        debug!("OpenAI audio channel closed after {} frames", frames_sent);
                        if let Err(e) = send_commit(&mut ws_sink).await {
                            warn!("Failed to send OpenAI commit: {}", e);
                        }
                        break;
                    }
                }
            }
        }
    }

    let _ = ws_sink.close().await;
}

async fn send_commit<S>(ws_sink: &mut S) -> Result<(), String>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(&RealtimeClientMessage::InputAudioBufferCommit)
        .map_err(|e| e.to_string())?;
    ws_sink
        .send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// Translate upstream events into the normalized adapter vocabulary
async fn run_receive_loop(
    mut ws_reader: impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
    events: &mpsc::Sender<AdapterEvent>,
    control_tx: &mpsc::Sender<Message>,
    stop_rx: watch::Receiver<bool>,
    tuning: &SessionTuning,
) {
    while let Some(msg_result) = ws_reader.next().await {
        if *stop_rx.borrow() {
            break;
        }

        match msg_result {
            Ok(Message::Text(text)) => {
                trace!("OpenAI message: {}", text);
                match serde_json::from_str::<RealtimeServerEvent>(&text) {
                    Ok(event) => {
                        if let Some(normalized) =
                            handle_server_event(event, control_tx, tuning).await
                        {
                            let _ = events.send(normalized).await;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse OpenAI message: {} - {}", e, text);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("OpenAI WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                trace!("OpenAI WebSocket ping/pong");
            }
            Err(e) => {
                if !*stop_rx.borrow() {
                    error!("OpenAI WebSocket receive error: {}", e);
                    let _ = events
                        .send(AdapterEvent::Error {
                            message: format!("OpenAI connection error: {}", e),
                        })
                        .await;
                }
                break;
            }
            _ => {}
        }
    }
}

/// Map one provider event to at most one normalized event
async fn handle_server_event(
    event: RealtimeServerEvent,
    control_tx: &mpsc::Sender<Message>,
    tuning: &SessionTuning,
) -> Option<AdapterEvent> {
    if let Some(error_msg) = event.error_message() {
        // The "buffer too small" error is expected when committing on stop
        if error_msg.contains("buffer too small") || error_msg.contains("empty") {
            debug!("OpenAI buffer empty on commit (expected): {}", error_msg);
            return None;
        }
        error!("OpenAI STT error: {}", error_msg);
        return Some(AdapterEvent::Error { message: error_msg });
    }

    match event {
        RealtimeServerEvent::TranscriptionSessionCreated { .. } => {
            info!("OpenAI transcription session created");
            let config = RealtimeSessionConfig::from_tuning(tuning);
            let msg = RealtimeClientMessage::TranscriptionSessionUpdate { session: config };
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    let _ = control_tx.send(Message::Text(json)).await;
                }
                Err(e) => error!("Failed to serialize session update: {}", e),
            }
            Some(AdapterEvent::Ready)
        }
        RealtimeServerEvent::TranscriptionSessionUpdated { .. } => {
            info!("OpenAI transcription session updated");
            None
        }
        RealtimeServerEvent::InputAudioBufferCommitted {
            item_id,
            previous_item_id,
        } => {
            // Linkage passes through verbatim; the text arrives later via
            // delta/completed events for the same item
            item_id.map(|item_id| {
                debug!(
                    "OpenAI committed item {} (previous: {:?})",
                    item_id, previous_item_id
                );
                AdapterEvent::Fragment(TranscriptFragment {
                    item_id,
                    previous_item_id,
                    text: String::new(),
                    is_final: false,
                })
            })
        }
        RealtimeServerEvent::TranscriptionDelta { item_id, delta } => {
            match (item_id, delta) {
                (Some(item_id), Some(delta)) if !delta.is_empty() => {
                    trace!("OpenAI delta for {}: {}", item_id, delta);
                    Some(AdapterEvent::Fragment(TranscriptFragment {
                        item_id,
                        previous_item_id: None,
                        text: delta,
                        is_final: false,
                    }))
                }
                _ => None,
            }
        }
        RealtimeServerEvent::TranscriptionCompleted { item_id, transcript } => {
            match (item_id, transcript) {
                (Some(item_id), Some(transcript)) => {
                    debug!("OpenAI completed {}: {}", item_id, transcript);
                    Some(AdapterEvent::Fragment(TranscriptFragment {
                        item_id,
                        previous_item_id: None,
                        text: transcript,
                        is_final: true,
                    }))
                }
                _ => None,
            }
        }
        RealtimeServerEvent::InputAudioBufferSpeechStarted => {
            debug!("OpenAI VAD: speech started");
            Some(AdapterEvent::SpeechStarted)
        }
        RealtimeServerEvent::InputAudioBufferSpeechStopped => {
            debug!("OpenAI VAD: speech stopped");
            Some(AdapterEvent::SpeechStopped)
        }
        RealtimeServerEvent::Error { .. } | RealtimeServerEvent::Other => None,
    }
}
