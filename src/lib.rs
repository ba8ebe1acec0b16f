//! Real-time transcription session relay
//!
//! Bridges editor clients to streaming speech-to-text providers over a
//! single WebSocket each, normalizes both provider protocols into one
//! fragment vocabulary, and provides the client-side pieces that turn
//! fragments back into ordered text: the transcript graph and the
//! cursor-anchored document merge.

pub mod adapter;
pub mod audio;
pub mod config;
pub mod document;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod transcript;
