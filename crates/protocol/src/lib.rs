//! Wire protocol for Skiff client-server communication.
//!
//! Clients talk to the relay over a persistent WebSocket. Text frames carry
//! a JSON [`envelope::Message`] with a type tag and a lazily-parsed payload;
//! binary frames carry raw file chunk bytes and are the wire form of the
//! `file_data` event in both directions. A JSON `file_data` payload with
//! base64-encoded bytes is accepted as a fallback for clients whose event
//! library cannot emit binary frames.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod names;

pub use constants::MessageType;
pub use names::{InvalidName, validate_name};
