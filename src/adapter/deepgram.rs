//! Deepgram streaming adapter (pro mode)
//!
//! Speaks the Deepgram listen protocol: session configuration in the URL,
//! raw binary audio frames upstream, JSON results downstream. Deepgram
//! attaches no ordering metadata to its results, so this adapter assigns a
//! monotonically increasing synthetic item chain - arrival order is the
//! only ordering signal the provider offers.

use super::deepgram_messages::{build_ws_url, DeepgramClientMessage, DeepgramServerEvent};
use super::{AdapterEvent, AdapterHandle, AdapterLink};
use crate::audio::AudioFrame;
use crate::error::{RelayError, WS_CONNECT_TIMEOUT_SECS};
use crate::protocol::SessionTuning;
use crate::transcript::TranscriptFragment;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

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
                message: RelayError::Config("Deepgram API key not configured".to_string())
                    .to_string(),
            })
            .await;
        let _ = events.send(AdapterEvent::Closed).await;
        return;
    };

    let request = match build_ws_request(&api_key, &tuning) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to build Deepgram WebSocket request: {}", e);
            let _ = events.send(AdapterEvent::Error { message: e }).await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
    };

    info!("Connecting to Deepgram for STT");
    let ws_stream = match timeout(
        Duration::from_secs(WS_CONNECT_TIMEOUT_SECS),
        connect_async(request),
    )
    .await
    {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            error!("Deepgram WebSocket connection failed: {}", e);
            let _ = events
                .send(AdapterEvent::Error {
                    message: RelayError::Upstream(format!("Deepgram connection error: {}", e))
                        .to_string(),
                })
                .await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
        Err(_) => {
            error!("Deepgram WebSocket connection timed out");
            let _ = events
                .send(AdapterEvent::Error {
                    message: RelayError::Upstream("Deepgram connection timed out".to_string())
                        .to_string(),
                })
                .await;
            let _ = events.send(AdapterEvent::Closed).await;
            return;
        }
    };
    info!("Connected to Deepgram");

    // Deepgram has no session handshake beyond the URL parameters; the
    // socket being open means audio may flow
    let _ = events.send(AdapterEvent::Ready).await;

    let (ws_sink, ws_reader) = ws_stream.split();
    let send_task = tokio::spawn(run_send_task(ws_sink, audio_rx, stop_rx.clone()));

    run_receive_loop(ws_reader, &events, stop_rx).await;

    let _ = send_task.await;
    let _ = events.send(AdapterEvent::Closed).await;
}

/// Build the upstream request with Token auth; tuning rides in the URL
fn build_ws_request(
    api_key: &str,
    tuning: &SessionTuning,
) -> Result<http::Request<()>, String> {
    let url = build_ws_url(tuning).map_err(|e| e.to_string())?;
    let host = url
        .host_str()
        .ok_or_else(|| "Invalid Deepgram URL: no host".to_string())?
        .to_string();
    http::Request::builder()
        .uri(url.as_str())
        .header("Host", host)
        .header("Authorization", format!("Token {}", api_key))
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", super::helpers::generate_ws_key())
        .header("Sec-WebSocket-Version", "13")
        .body(())
        .map_err(|e| e.to_string())
}

/// Forward audio frames as raw binary; close the stream gracefully on stop
async fn run_send_task<S>(
    mut ws_sink: S,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    mut stop_rx: watch::Receiver<bool>,
) where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let mut frames_sent = 0u64;

    loop {
        tokio::select! {
            biased;

            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => {
                debug!("Deepgram send task stopping after {} frames", frames_sent);
                send_close_stream(&mut ws_sink).await;
                break;
            }
            frame = audio_rx.recv() => {
                match frame {
                    Some(frame) => {
                        frames_sent += 1;
                        if frames_sent == 1 || frames_sent % 100 == 0 {
                            trace!(
                                "Deepgram send task: frame #{}, {:.1}ms",
                                frames_sent,
                                frame.duration_ms()
                            );
                        }
                        if ws_sink.send(Message::Binary(frame.pcm_bytes())).await.is_err() {
                            error!("Failed to send Deepgram audio frame");
                            break;
                        }
                    }
                    None => {
                        debug!("Deepgram audio channel closed after {} frames", frames_sent);
                        send_close_stream(&mut ws_sink).await;
                        break;
                    }
                }
            }
        }
    }

    let _ = ws_sink.close().await;
}

async fn send_close_stream<S>(ws_sink: &mut S)
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    if let Ok(json) = serde_json::to_string(&DeepgramClientMessage::CloseStream) {
        if ws_sink.send(Message::Text(json)).await.is_err() {
            warn!("Failed to send Deepgram CloseStream");
        }
    }
}

/// Translate Deepgram results into the normalized adapter vocabulary
async fn run_receive_loop(
    mut ws_reader: impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
    events: &mpsc::Sender<AdapterEvent>,
    stop_rx: watch::Receiver<bool>,
) {
    let mut chain = SyntheticChain::default();

    while let Some(msg_result) = ws_reader.next().await {
        if *stop_rx.borrow() {
            break;
        }

        match msg_result {
            Ok(Message::Text(text)) => {
                trace!("Deepgram message: {}", text);
                match serde_json::from_str::<DeepgramServerEvent>(&text) {
                    Ok(event) => {
                        for normalized in normalize_event(event, &mut chain) {
                            let _ = events.send(normalized).await;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse Deepgram message: {} - {}", e, text);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Deepgram WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                trace!("Deepgram WebSocket ping/pong");
            }
            Err(e) => {
                if !*stop_rx.borrow() {
                    error!("Deepgram WebSocket receive error: {}", e);
                    let _ = events
                        .send(AdapterEvent::Error {
                            message: format!("Deepgram connection error: {}", e),
                        })
                        .await;
                }
                break;
            }
            _ => {}
        }
    }
}

/// Map one provider event to zero or more normalized events
fn normalize_event(event: DeepgramServerEvent, chain: &mut SyntheticChain) -> Vec<AdapterEvent> {
    let transcript = event.transcript().map(str::to_string);
    match event {
        DeepgramServerEvent::Results {
            is_final,
            speech_final,
            ..
        } => {
            let Some(text) = transcript else {
                return Vec::new();
            };
            let fragment = if is_final {
                debug!("Deepgram final: {}", text);
                chain.finalize(text)
            } else {
                trace!("Deepgram interim: {}", text);
                chain.interim(text)
            };
            let mut out = vec![AdapterEvent::Fragment(fragment)];
            if speech_final {
                out.push(AdapterEvent::SpeechStopped);
            }
            out
        }
        DeepgramServerEvent::UtteranceEnd => {
            debug!("Deepgram utterance ended");
            vec![AdapterEvent::SpeechStopped]
        }
        DeepgramServerEvent::Metadata { request_id } => {
            info!("Deepgram session started: {:?}", request_id);
            Vec::new()
        }
        DeepgramServerEvent::Other => Vec::new(),
    }
}

/// Monotonically increasing synthetic item chain
///
/// Interim results carry the id the current utterance will finalize under,
/// so a later final for the same utterance replaces the provisional entry
/// instead of creating a sibling.
#[derive(Debug, Default)]
struct SyntheticChain {
    next_index: u64,
}

impl SyntheticChain {
    fn current_id(&self) -> String {
        format!("seg-{}", self.next_index)
    }

    fn previous_id(&self) -> Option<String> {
        self.next_index
            .checked_sub(1)
            .map(|index| format!("seg-{}", index))
    }

    /// Provisional fragment for the in-progress utterance
    fn interim(&self, text: String) -> TranscriptFragment {
        TranscriptFragment {
            item_id: self.current_id(),
            previous_item_id: self.previous_id(),
            text,
            is_final: false,
        }
    }

    /// Settle the current utterance and advance the chain
    fn finalize(&mut self, text: String) -> TranscriptFragment {
        let fragment = TranscriptFragment {
            item_id: self.current_id(),
            previous_item_id: self.previous_id(),
            text,
            is_final: true,
        };
        self.next_index += 1;
        fragment
    }
}
