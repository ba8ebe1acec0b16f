//! Session relay
//!
//! Drives one client session: client messages and adapter events feed the
//! state machine in [`state`], and this loop performs the actions it
//! returns. Adapter construction is injected so tests can substitute a
//! scripted provider.

pub mod state;

use crate::adapter::{AdapterEvent, AdapterHandle};
use crate::audio::AudioFrame;
use crate::error::RelayError;
use crate::protocol::{ClientMessage, ProviderMode, ServerMessage, SessionTuning};
use self::state::{step, Action, SessionEvent, SessionState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run one session to completion
///
/// Returns when the session reaches its terminal state: the client
/// disconnected, requested a stop, or the provider failed. The server
/// layer owns the socket; this loop only sees decoded messages.
pub async fn run_session<F>(
    mut client_rx: mpsc::Receiver<ClientMessage>,
    client_tx: mpsc::Sender<ServerMessage>,
    mut connect: F,
) where
    F: FnMut(ProviderMode, Option<SessionTuning>) -> AdapterHandle + Send,
{
    let mut session = SessionState::Idle;
    let mut adapter: Option<AdapterHandle> = None;

    while session != SessionState::Closed {
        let event = tokio::select! {
            message = client_rx.recv() => {
                match message {
                    Some(message) => match client_event(message) {
                        Some(event) => event,
                        None => continue,
                    },
                    None => SessionEvent::ClientDisconnected,
                }
            }
            adapter_event = recv_adapter_event(&mut adapter) => {
                match adapter_event {
                    Some(AdapterEvent::Ready) => SessionEvent::ProviderReady,
                    Some(AdapterEvent::Fragment(fragment)) => {
                        SessionEvent::ProviderFragment(fragment)
                    }
                    Some(AdapterEvent::SpeechStarted) => SessionEvent::ProviderSpeechStarted,
                    Some(AdapterEvent::SpeechStopped) => SessionEvent::ProviderSpeechStopped,
                    Some(AdapterEvent::Error { message }) => {
                        SessionEvent::ProviderError { message }
                    }
                    Some(AdapterEvent::Closed) | None => SessionEvent::ProviderClosed,
                }
            }
        };

        let result = step(session, event);
        session = result.next;

        for action in result.actions {
            match action {
                Action::OpenAdapter { mode, tuning } => {
                    info!("Opening {} transcription session", mode);
                    adapter = Some(connect(mode, tuning));
                }
                Action::ForwardAudio(frame) => {
                    if let Some(adapter) = &adapter {
                        adapter.send_audio(frame);
                    }
                }
                Action::Send(message) => {
                    if client_tx.send(message).await.is_err() {
                        debug!("Client channel closed while sending");
                    }
                }
                Action::CloseAdapter => {
                    if let Some(adapter) = &adapter {
                        adapter.close();
                    }
                }
            }
        }
    }

    // The loop can exit with the adapter still up (client disconnect)
    if let Some(adapter) = &adapter {
        adapter.close();
    }
    info!("Session closed");
}

/// Decode one client message into a session event
///
/// Undecodable audio is dropped and the session continues; the client is
/// streaming and a single bad frame is not worth tearing down for.
fn client_event(message: ClientMessage) -> Option<SessionEvent> {
    match message {
        ClientMessage::Init { mode, session } => Some(SessionEvent::ClientInit {
            mode,
            tuning: session,
        }),
        ClientMessage::Audio { audio } => match AudioFrame::from_base64(&audio) {
            Ok(frame) => Some(SessionEvent::ClientAudio(frame)),
            Err(e) => {
                warn!("{}", RelayError::Protocol(format!("undecodable audio frame: {}", e)));
                None
            }
        },
        ClientMessage::Stop => Some(SessionEvent::ClientStop),
    }
}

/// Receive the next adapter event, or park forever if no adapter exists yet
async fn recv_adapter_event(adapter: &mut Option<AdapterHandle>) -> Option<AdapterEvent> {
    match adapter {
        Some(adapter) => adapter.events.recv().await,
        None => std::future::pending().await,
    }
}
