//! End-to-end session flows through the relay
//!
//! Drives `relay::run_session` directly with channel endpoints and a
//! scripted adapter, exercising the full path from client messages to
//! reconstructed transcript text without sockets or live providers.

use tokio::sync::mpsc;
use voxrelay::adapter::{AdapterEvent, AdapterHandle, AdapterLink};
use voxrelay::audio::AudioFrame;
use voxrelay::config::RelayConfig;
use voxrelay::document::{Document, RecordingMerge};
use voxrelay::protocol::{ClientMessage, ProviderMode, ServerMessage, SessionTuning};
use voxrelay::relay::run_session;
use voxrelay::transcript::{TranscriptFragment, TranscriptGraph};

struct Harness {
    client: mpsc::Sender<ClientMessage>,
    server: mpsc::Receiver<ServerMessage>,
    session: tokio::task::JoinHandle<()>,
}

/// Start a session wired to a scripted adapter instead of a live provider
fn start_session() -> (Harness, AdapterLink) {
    let (client_tx, client_rx) = mpsc::channel(16);
    let (server_tx, server_rx) = mpsc::channel(16);
    let (handle, link) = AdapterHandle::pair();
    let mut slot = Some(handle);
    let session = tokio::spawn(run_session(client_rx, server_tx, move |_, _| {
        slot.take().expect("session opened more than one adapter")
    }));
    (
        Harness {
            client: client_tx,
            server: server_rx,
            session,
        },
        link,
    )
}

fn fragment(id: &str, prev: Option<&str>, text: &str, is_final: bool) -> TranscriptFragment {
    TranscriptFragment {
        item_id: id.to_string(),
        previous_item_id: prev.map(String::from),
        text: text.to_string(),
        is_final,
    }
}

fn init(mode: ProviderMode) -> ClientMessage {
    ClientMessage::Init {
        mode,
        session: None,
    }
}

fn audio_message(sample: i16) -> ClientMessage {
    let frame = AudioFrame {
        samples: vec![sample; 4],
    };
    ClientMessage::Audio {
        audio: frame.to_base64(),
    }
}

#[tokio::test]
async fn happy_path_relays_fragments_in_linkage_order() {
    let (mut harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Classic)).await.unwrap();
    link.events.send(AdapterEvent::Ready).await.unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Ready)
    ));

    for sample in 0..3 {
        harness.client.send(audio_message(sample)).await.unwrap();
    }
    for sample in 0..3 {
        let frame = link.audio_rx.recv().await.unwrap();
        assert_eq!(frame.samples, vec![sample; 4]);
    }

    // Provider delivers finals out of arrival order; linkage restores it
    link.events
        .send(AdapterEvent::Fragment(fragment(
            "2",
            Some("1"),
            "world",
            true,
        )))
        .await
        .unwrap();
    link.events
        .send(AdapterEvent::Fragment(fragment("1", None, "hello", true)))
        .await
        .unwrap();

    let mut graph = TranscriptGraph::new();
    for _ in 0..2 {
        match harness.server.recv().await {
            Some(ServerMessage::Fragment { fragment }) => graph.ingest(fragment),
            other => panic!("Expected fragment, got {:?}", other),
        }
    }
    assert_eq!(graph.render(), "hello world");

    harness.client.send(ClientMessage::Stop).await.unwrap();
    link.stopped().await;
    link.events.send(AdapterEvent::Closed).await.unwrap();

    // Expected teardown is silent: the channel just closes
    assert!(harness.server.recv().await.is_none());
    harness.session.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn audio_before_ready_is_dropped_not_queued() {
    let (harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Classic)).await.unwrap();
    harness.client.send(audio_message(7)).await.unwrap();

    // Let the relay drain the pre-ready frame before the provider comes up
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    link.events.send(AdapterEvent::Ready).await.unwrap();

    let mut server = harness.server;
    assert!(matches!(server.recv().await, Some(ServerMessage::Ready)));

    harness.client.send(audio_message(9)).await.unwrap();
    let first = link.audio_rx.recv().await.unwrap();
    // The pre-ready frame never reached the adapter
    assert_eq!(first.samples, vec![9; 4]);
}

#[tokio::test]
async fn missing_credentials_surface_as_client_error() {
    let config = RelayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        openai_api_key: None,
        deepgram_api_key: None,
        tuning: SessionTuning::default(),
    };

    let (client_tx, client_rx) = mpsc::channel(16);
    let (server_tx, mut server_rx) = mpsc::channel(16);
    let session = tokio::spawn(run_session(client_rx, server_tx, move |mode, tuning| {
        voxrelay::adapter::spawn(&config, mode, tuning)
    }));

    client_tx.send(init(ProviderMode::Pro)).await.unwrap();

    match server_rx.recv().await {
        Some(ServerMessage::Error { message }) => {
            assert!(message.contains("not configured"), "message: {}", message);
        }
        other => panic!("Expected error, got {:?}", other),
    }
    assert!(server_rx.recv().await.is_none());
    session.await.unwrap();
}

#[tokio::test]
async fn duplicate_init_rejected_session_survives() {
    let (mut harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Classic)).await.unwrap();
    link.events.send(AdapterEvent::Ready).await.unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Ready)
    ));

    harness.client.send(init(ProviderMode::Pro)).await.unwrap();
    match harness.server.recv().await {
        Some(ServerMessage::Error { message }) => {
            assert!(message.contains("already initialized"));
        }
        other => panic!("Expected error, got {:?}", other),
    }

    // The original session is still live
    link.events
        .send(AdapterEvent::Fragment(fragment("1", None, "still here", true)))
        .await
        .unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Fragment { .. })
    ));
}

#[tokio::test]
async fn stop_before_init_closes_silently() {
    let (client_tx, client_rx) = mpsc::channel::<ClientMessage>(16);
    let (server_tx, mut server_rx) = mpsc::channel(16);
    let session = tokio::spawn(run_session(client_rx, server_tx, |_, _| {
        panic!("no adapter should be opened")
    }));

    client_tx.send(ClientMessage::Stop).await.unwrap();
    assert!(server_rx.recv().await.is_none());
    session.await.unwrap();
}

#[tokio::test]
async fn client_disconnect_tears_down_adapter() {
    let (harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Classic)).await.unwrap();
    link.events.send(AdapterEvent::Ready).await.unwrap();

    // Dropping the sender is the disconnect signal the server layer uses
    drop(harness.client);
    link.stopped().await;
    harness.session.await.unwrap();
}

#[tokio::test]
async fn unexpected_provider_close_notifies_client() {
    let (mut harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Classic)).await.unwrap();
    link.events.send(AdapterEvent::Ready).await.unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Ready)
    ));

    link.events.send(AdapterEvent::Closed).await.unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Disconnected { .. })
    ));
    harness.session.await.unwrap();
}

/// Full pipeline: capture samples through the relay into a merged document
#[tokio::test]
async fn transcription_lands_in_document_at_cursor() {
    let (mut harness, mut link) = start_session();

    harness.client.send(init(ProviderMode::Pro)).await.unwrap();
    link.events.send(AdapterEvent::Ready).await.unwrap();
    assert!(matches!(
        harness.server.recv().await,
        Some(ServerMessage::Ready)
    ));

    let mut encoder = voxrelay::audio::FrameEncoder::new(24_000, 1).unwrap();
    let samples = vec![0.25f32; voxrelay::audio::FRAME_SAMPLES];
    for frame in encoder.push(&samples).unwrap() {
        harness
            .client
            .send(ClientMessage::Audio {
                audio: frame.to_base64(),
            })
            .await
            .unwrap();
    }
    assert_eq!(
        link.audio_rx.recv().await.unwrap().samples.len(),
        voxrelay::audio::FRAME_SAMPLES
    );

    link.events
        .send(AdapterEvent::Fragment(fragment("seg-0", None, "note to", true)))
        .await
        .unwrap();
    link.events
        .send(AdapterEvent::Fragment(fragment(
            "seg-1",
            Some("seg-0"),
            "self",
            true,
        )))
        .await
        .unwrap();

    let mut doc = Document::new("meeting: budget");
    doc.set_cursor(8); // after "meeting:"
    let mut merge = RecordingMerge::begin(&doc);
    let mut graph = TranscriptGraph::new();
    for _ in 0..2 {
        match harness.server.recv().await {
            Some(ServerMessage::Fragment { fragment }) if fragment.is_final => {
                graph.ingest(fragment);
            }
            other => panic!("Expected final fragment, got {:?}", other),
        }
    }
    merge.apply_final(&graph.render());

    assert_eq!(merge.finish().text(), "meeting: note to self budget");
}
