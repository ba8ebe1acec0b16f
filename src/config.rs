//! Runtime configuration
//!
//! All configuration comes from the environment (a `.env` file is loaded
//! in `main` before this runs). Provider API keys are optional at startup:
//! a session that selects a provider with no key gets a client-visible
//! error for that session only, and the server keeps serving.

use crate::protocol::SessionTuning;
use std::env;
use tracing::warn;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Key for classic-mode sessions (OpenAI Realtime)
    pub openai_api_key: Option<String>,
    /// Key for pro-mode sessions (Deepgram streaming)
    pub deepgram_api_key: Option<String>,
    /// Default session tuning for clients that send none
    pub tuning: SessionTuning,
}

impl RelayConfig {
    /// Build the configuration from environment variables
    ///
    /// `VOXRELAY_HOST` and `VOXRELAY_PORT` control the bind address, with
    /// `PORT` honored as a fallback for platform-injected ports. Keys come
    /// from `OPENAI_API_KEY` and `DEEPGRAM_API_KEY`.
    pub fn from_env() -> Self {
        let host = env_nonempty("VOXRELAY_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_port(
            env_nonempty("VOXRELAY_PORT").or_else(|| env_nonempty("PORT")),
        );

        let openai_api_key = env_nonempty("OPENAI_API_KEY");
        let deepgram_api_key = env_nonempty("DEEPGRAM_API_KEY");
        if openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set - classic mode sessions will be rejected");
        }
        if deepgram_api_key.is_none() {
            warn!("DEEPGRAM_API_KEY not set - pro mode sessions will be rejected");
        }

        Self {
            bind_addr: format!("{}:{}", host, port),
            openai_api_key,
            deepgram_api_key,
            tuning: SessionTuning::default(),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a port value, falling back to the default on garbage
fn parse_port(value: Option<String>) -> u16 {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(port) => port,
            Err(_) => {
                warn!("Invalid port {:?}, using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }
        },
        None => DEFAULT_PORT,
    }
}
