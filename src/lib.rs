//! Realtime voice streaming client.
//!
//! A persistent WebSocket client for speech relays: microphone frames go
//! out as base64 PCM16, server-VAD events, transcript deltas and
//! synthesized audio come back, and a turn-taking state machine keeps the
//! conversation coherent. Playback is scheduled gaplessly; audio devices
//! and the socket itself sit behind traits so the whole pipeline runs in
//! tests without hardware or a network.
//!
//! ```no_run
//! use std::sync::Arc;
//! use voicestream::{ClientConfig, VoiceClient, WsConnector};
//! # use voicestream::{AudioInput, AudioSink};
//! # async fn run(mic: Arc<dyn AudioInput>, speaker: Arc<dyn AudioSink>) -> voicestream::VoiceResult<()> {
//! let config = ClientConfig {
//!     relay_url: "wss://relay.example.com/v1/stream".into(),
//!     api_key: "sk-...".into(),
//!     ..Default::default()
//! };
//! let mut client = VoiceClient::new(config, Arc::new(WsConnector::new()), mic, speaker);
//! client.on_transcript(Arc::new(|update| println!("{}: {}", update.speaker, update.text)));
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod level;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

pub use capture::{AudioInput, AudioSource};
pub use client::VoiceClient;
pub use config::{ClientConfig, PromptSource, SessionConfig, TurnDetection};
pub use connection::LinkPhase;
pub use error::{CaptureError, DecodeError, VoiceError, VoiceResult};
pub use playback::{AudioSink, MonotonicClock, PlaybackClock};
pub use session::{Speaker, TranscriptUpdate};
pub use state::ConversationState;
pub use transport::{Connector, Transport, TransportEvent, WsConnector};
