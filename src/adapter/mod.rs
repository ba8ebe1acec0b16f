//! Provider adapters
//!
//! Each adapter speaks exactly one upstream streaming protocol and exposes
//! the same normalized event vocabulary to the session relay. An adapter is
//! selected once at session init and never swapped mid-session.

mod deepgram;
mod deepgram_messages;
mod helpers;
mod openai;
mod openai_messages;

use crate::audio::AudioFrame;
use crate::config::RelayConfig;
use crate::protocol::{ProviderMode, SessionTuning};
use crate::transcript::TranscriptFragment;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Capacity of the audio frame channel into an adapter
///
/// Roughly 25 seconds of audio at 100 ms per frame; overflow drops frames
/// rather than blocking the relay.
const AUDIO_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the normalized event channel out of an adapter
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Normalized events emitted by every adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// Upstream connection established and configured; audio may flow
    Ready,
    /// One recognized-speech fragment, interim or final
    Fragment(TranscriptFragment),
    /// Provider VAD detected start of speech
    SpeechStarted,
    /// Provider VAD detected end of speech
    SpeechStopped,
    /// Session-fatal upstream failure (missing credentials, socket error)
    Error { message: String },
    /// Upstream connection is gone; always the adapter's last event
    Closed,
}

/// Uniform handle to one running adapter
///
/// `send_audio` never blocks and never fails: frames sent while the
/// upstream is not writable are dropped, a deliberate backpressure choice
/// (queuing pre-ready audio risks unbounded buildup if the provider is
/// slow to authenticate). `close` is idempotent and safe from any state.
pub struct AdapterHandle {
    audio_tx: mpsc::Sender<AudioFrame>,
    pub events: mpsc::Receiver<AdapterEvent>,
    stop_tx: watch::Sender<bool>,
}

/// The adapter-task side of an [`AdapterHandle`]
pub struct AdapterLink {
    pub audio_rx: mpsc::Receiver<AudioFrame>,
    pub events: mpsc::Sender<AdapterEvent>,
    pub stop_rx: watch::Receiver<bool>,
}

impl AdapterHandle {
    /// Create a connected handle/link pair
    ///
    /// Adapter implementations move the link into their driver task; tests
    /// keep it to script provider behavior without a network.
    pub fn pair() -> (AdapterHandle, AdapterLink) {
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        (
            AdapterHandle {
                audio_tx,
                events: event_rx,
                stop_tx,
            },
            AdapterLink {
                audio_rx,
                events: event_tx,
                stop_rx,
            },
        )
    }

    /// Forward one audio frame; drops silently if the adapter cannot take it
    pub fn send_audio(&self, frame: AudioFrame) {
        if self.audio_tx.try_send(frame).is_err() {
            trace!("Adapter audio channel full or closed - frame dropped");
        }
    }

    /// Request teardown; idempotent, safe from any state
    pub fn close(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Whether teardown has been requested
    pub fn is_closed(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

impl AdapterLink {
    /// Whether the owning handle requested teardown
    pub fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Resolve once teardown is requested; never misses the signal
    pub async fn stopped(&mut self) {
        // wait_for observes the current value first, so a close that
        // happened before this call still resolves immediately
        let _ = self.stop_rx.wait_for(|stopped| *stopped).await;
    }
}

/// Spawn the adapter matching the requested mode
///
/// Always returns a handle; configuration problems (such as a missing API
/// key) surface as an `Error` event followed by `Closed`, never a fault.
pub fn spawn(
    config: &RelayConfig,
    mode: ProviderMode,
    tuning: Option<SessionTuning>,
) -> AdapterHandle {
    let tuning = tuning.unwrap_or_else(|| config.tuning.clone());
    match mode {
        ProviderMode::Classic => openai::spawn(config.openai_api_key.clone(), tuning),
        ProviderMode::Pro => deepgram::spawn(config.deepgram_api_key.clone(), tuning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_audio_never_fails_when_link_dropped() {
        let (handle, link) = AdapterHandle::pair();
        drop(link);
        // Must not panic or error even though nobody is listening
        handle.send_audio(AudioFrame { samples: vec![0; 4] });
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (handle, link) = AdapterHandle::pair();
        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert!(link.stop_requested());
    }

    #[tokio::test]
    async fn test_close_before_wait_still_resolves() {
        let (handle, mut link) = AdapterHandle::pair();
        handle.close();
        // Must not hang even though close happened before the wait
        link.stopped().await;
        assert!(link.stop_requested());
    }
}
