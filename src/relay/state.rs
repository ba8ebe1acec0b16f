//! Session state machine
//!
//! The relay's behavior is a pure function from (state, event) to
//! (state, actions). The driver loop in the parent module owns all I/O and
//! just interprets the actions, which keeps every transition testable
//! without sockets or tasks.

use crate::audio::AudioFrame;
use crate::protocol::{ProviderMode, ServerMessage, SessionTuning};
use crate::transcript::TranscriptFragment;
use tracing::trace;

/// Lifecycle of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no `init` received yet
    Idle,
    /// Adapter spawned, waiting for the provider to become ready
    Connecting,
    /// Provider ready, no audio seen yet
    Ready,
    /// Audio is flowing
    Recording,
    /// Client requested stop; draining trailing provider results
    Stopping,
    /// Terminal; the driver loop exits
    Closed,
}

/// Everything that can happen to a session
#[derive(Debug)]
pub enum SessionEvent {
    ClientInit {
        mode: ProviderMode,
        tuning: Option<SessionTuning>,
    },
    ClientAudio(AudioFrame),
    ClientStop,
    ClientDisconnected,
    ProviderReady,
    ProviderFragment(TranscriptFragment),
    ProviderSpeechStarted,
    ProviderSpeechStopped,
    ProviderError { message: String },
    ProviderClosed,
}

/// Side effects the driver loop must perform
#[derive(Debug)]
pub enum Action {
    /// Spawn the adapter for the requested provider
    OpenAdapter {
        mode: ProviderMode,
        tuning: Option<SessionTuning>,
    },
    /// Pass one audio frame to the adapter
    ForwardAudio(AudioFrame),
    /// Send a message to the client
    Send(ServerMessage),
    /// Request adapter teardown
    CloseAdapter,
}

/// Result of one transition
#[derive(Debug)]
pub struct Step {
    pub next: SessionState,
    pub actions: Vec<Action>,
}

impl Step {
    fn stay(state: SessionState) -> Self {
        Step {
            next: state,
            actions: Vec::new(),
        }
    }

    fn to(next: SessionState, actions: Vec<Action>) -> Self {
        Step { next, actions }
    }
}

/// Apply one event to the session
pub fn step(state: SessionState, event: SessionEvent) -> Step {
    use SessionState::*;

    match event {
        SessionEvent::ClientInit { mode, tuning } => match state {
            Idle => Step::to(Connecting, vec![Action::OpenAdapter { mode, tuning }]),
            Closed => Step::stay(state),
            // One provider per session; a second init is a client bug
            _ => Step::to(
                state,
                vec![Action::Send(ServerMessage::Error {
                    message: "Session already initialized".to_string(),
                })],
            ),
        },

        SessionEvent::ClientAudio(frame) => match state {
            Ready | Recording => Step::to(Recording, vec![Action::ForwardAudio(frame)]),
            // Audio before ready (or after stop) is dropped, not queued:
            // buffering against a provider that never comes up grows
            // without bound
            _ => {
                trace!("Dropping audio frame in state {:?}", state);
                Step::stay(state)
            }
        },

        SessionEvent::ClientStop => match state {
            Idle => Step::to(Closed, Vec::new()),
            Connecting | Ready | Recording => Step::to(Stopping, vec![Action::CloseAdapter]),
            Stopping | Closed => Step::stay(state),
        },

        SessionEvent::ClientDisconnected => match state {
            Connecting | Ready | Recording | Stopping => {
                Step::to(Closed, vec![Action::CloseAdapter])
            }
            _ => Step::to(Closed, Vec::new()),
        },

        SessionEvent::ProviderReady => match state {
            Connecting => Step::to(Ready, vec![Action::Send(ServerMessage::Ready)]),
            _ => Step::stay(state),
        },

        // Fragments keep flowing while stopping so trailing finals are
        // not lost
        SessionEvent::ProviderFragment(fragment) => match state {
            Ready | Recording | Stopping => Step::to(
                state,
                vec![Action::Send(ServerMessage::Fragment { fragment })],
            ),
            _ => Step::stay(state),
        },

        SessionEvent::ProviderSpeechStarted => match state {
            Ready | Recording | Stopping => {
                Step::to(state, vec![Action::Send(ServerMessage::SpeechStarted)])
            }
            _ => Step::stay(state),
        },

        SessionEvent::ProviderSpeechStopped => match state {
            Ready | Recording | Stopping => {
                Step::to(state, vec![Action::Send(ServerMessage::SpeechStopped)])
            }
            _ => Step::stay(state),
        },

        SessionEvent::ProviderError { message } => match state {
            Connecting | Ready | Recording => Step::to(
                Closed,
                vec![
                    Action::Send(ServerMessage::Error { message }),
                    Action::CloseAdapter,
                ],
            ),
            // The client already asked to stop; the error adds nothing
            Stopping => Step::to(Closed, vec![Action::CloseAdapter]),
            _ => Step::stay(state),
        },

        SessionEvent::ProviderClosed => match state {
            // Expected teardown, nothing to report
            Stopping => Step::to(Closed, Vec::new()),
            Connecting | Ready | Recording => Step::to(
                Closed,
                vec![Action::Send(ServerMessage::Disconnected {
                    message: "Transcription service disconnected".to_string(),
                })],
            ),
            _ => Step::stay(state),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    fn frame() -> AudioFrame {
        AudioFrame {
            samples: vec![0; 4],
        }
    }

    fn fragment() -> TranscriptFragment {
        TranscriptFragment {
            item_id: "item_1".to_string(),
            previous_item_id: None,
            text: "hello".to_string(),
            is_final: true,
        }
    }

    #[test]
    fn test_init_from_idle_opens_adapter() {
        let step = step(
            Idle,
            SessionEvent::ClientInit {
                mode: ProviderMode::Pro,
                tuning: None,
            },
        );
        assert_eq!(step.next, Connecting);
        assert!(matches!(
            step.actions.as_slice(),
            [Action::OpenAdapter {
                mode: ProviderMode::Pro,
                ..
            }]
        ));
    }

    #[test]
    fn test_duplicate_init_rejected_without_state_change() {
        for state in [Connecting, Ready, Recording, Stopping] {
            let result = step(
                state,
                SessionEvent::ClientInit {
                    mode: ProviderMode::Classic,
                    tuning: None,
                },
            );
            assert_eq!(result.next, state);
            assert!(matches!(
                result.actions.as_slice(),
                [Action::Send(ServerMessage::Error { .. })]
            ));
        }
    }

    #[test]
    fn test_audio_forwarded_when_ready_or_recording() {
        for state in [Ready, Recording] {
            let result = step(state, SessionEvent::ClientAudio(frame()));
            assert_eq!(result.next, Recording);
            assert!(matches!(
                result.actions.as_slice(),
                [Action::ForwardAudio(_)]
            ));
        }
    }

    #[test]
    fn test_audio_dropped_before_ready() {
        for state in [Idle, Connecting, Stopping, Closed] {
            let result = step(state, SessionEvent::ClientAudio(frame()));
            assert_eq!(result.next, state);
            assert!(result.actions.is_empty());
        }
    }

    #[test]
    fn test_stop_from_idle_closes_silently() {
        let result = step(Idle, SessionEvent::ClientStop);
        assert_eq!(result.next, Closed);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_stop_with_adapter_enters_stopping() {
        for state in [Connecting, Ready, Recording] {
            let result = step(state, SessionEvent::ClientStop);
            assert_eq!(result.next, Stopping);
            assert!(matches!(result.actions.as_slice(), [Action::CloseAdapter]));
        }
    }

    #[test]
    fn test_provider_ready_only_honored_while_connecting() {
        let result = step(Connecting, SessionEvent::ProviderReady);
        assert_eq!(result.next, Ready);
        assert!(matches!(
            result.actions.as_slice(),
            [Action::Send(ServerMessage::Ready)]
        ));

        let result = step(Recording, SessionEvent::ProviderReady);
        assert_eq!(result.next, Recording);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_fragments_relay_while_stopping() {
        let result = step(Stopping, SessionEvent::ProviderFragment(fragment()));
        assert_eq!(result.next, Stopping);
        assert!(matches!(
            result.actions.as_slice(),
            [Action::Send(ServerMessage::Fragment { .. })]
        ));
    }

    #[test]
    fn test_provider_error_reports_and_closes() {
        for state in [Connecting, Ready, Recording] {
            let result = step(
                state,
                SessionEvent::ProviderError {
                    message: "boom".to_string(),
                },
            );
            assert_eq!(result.next, Closed);
            assert!(matches!(
                result.actions.as_slice(),
                [
                    Action::Send(ServerMessage::Error { .. }),
                    Action::CloseAdapter
                ]
            ));
        }
    }

    #[test]
    fn test_provider_error_while_stopping_is_silent() {
        let result = step(
            Stopping,
            SessionEvent::ProviderError {
                message: "boom".to_string(),
            },
        );
        assert_eq!(result.next, Closed);
        assert!(matches!(result.actions.as_slice(), [Action::CloseAdapter]));
    }

    #[test]
    fn test_provider_closed_after_stop_is_expected() {
        let result = step(Stopping, SessionEvent::ProviderClosed);
        assert_eq!(result.next, Closed);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_unexpected_provider_close_notifies_client() {
        for state in [Connecting, Ready, Recording] {
            let result = step(state, SessionEvent::ProviderClosed);
            assert_eq!(result.next, Closed);
            assert!(matches!(
                result.actions.as_slice(),
                [Action::Send(ServerMessage::Disconnected { .. })]
            ));
        }
    }

    #[test]
    fn test_client_disconnect_tears_down_adapter() {
        for state in [Connecting, Ready, Recording, Stopping] {
            let result = step(state, SessionEvent::ClientDisconnected);
            assert_eq!(result.next, Closed);
            assert!(matches!(result.actions.as_slice(), [Action::CloseAdapter]));
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        let result = step(
            Closed,
            SessionEvent::ClientInit {
                mode: ProviderMode::Classic,
                tuning: None,
            },
        );
        assert_eq!(result.next, Closed);
        assert!(result.actions.is_empty());
    }
}
