//! # Turnloop Core Library
//!
//! Consume a turn-based conversational bot backend as one continuous, cancellable
//! stream of activities.
//!
//! - [`reactive`]: cancellation tokens, single-resolution futures, multicast event
//!   sources, an async serializer and a single-consumer ordered queue.
//! - [`client`]: the turn protocol over buffered polling or server-sent events.
//! - [`adapter`]: the orchestrator that turns repeated network turns into the
//!   `activities()` / `connection_statuses()` streams and a serialized `post_activity`.

pub mod adapter;
pub mod client;
pub mod error;
pub mod models;
pub mod reactive;
pub mod services;

pub use adapter::{from_turn_api, ChatAdapterOptions, TurnBasedChatAdapter};
pub use client::{TurnApi, TurnClient};
pub use error::TurnError;
pub use models::{Activity, ConnectionStatus, ConversationId, Transport};
