//! Protocol module for peer messages
//!
//! Defines the message envelope shared by publishers and subscribers.
//! The transport only looks at `type`, `sender` and `receiver`.

mod messages;

pub use messages::*;
