//! endstate-client: a Rust client for the Endstate chat API.
//!
//! [`ChatClient`] sends messages idempotently and opens the SSE stream,
//! [`Subscriber`] keeps a [`ChatStore`] current across dropped connections.

pub mod backoff;
pub mod client;
pub mod error;
pub mod session_file;
pub mod sse;
pub mod store;
pub mod subscriber;

pub use backoff::Backoff;
pub use client::{ChatClient, MessagesSnapshot, SendReceipt};
pub use error::{ClientError, Result};
pub use sse::{SseDecoder, SseFrame};
pub use store::ChatStore;
pub use subscriber::{Subscriber, SubscriberConfig};
