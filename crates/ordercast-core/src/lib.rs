//! # ordercast-core
//!
//! Shared vocabulary for the ordercast realtime client.
//!
//! - **Connection state**: [`ConnectionState`] and its transition table
//! - **Notifications**: [`Notification`], [`Category`], [`TableLifecycleState`],
//!   and validation of raw server payloads
//! - **Wire**: event names and outbound payload builders
//! - **Errors**: the [`ClientError`] hierarchy via `thiserror`
//! - **Credentials**: [`Credential`] wrapper and the [`CredentialProvider`] seam
//! - **Retry**: exponential backoff math used by transports
//! - **Logging**: `tracing` subscriber setup and capture utilities for tests

#![deny(unsafe_code)]

pub mod constants;
pub mod credential;
pub mod errors;
pub mod logging;
pub mod notification;
pub mod retry;
pub mod state;
pub mod wire;

pub use credential::{Credential, CredentialProvider, StaticCredential};
pub use errors::{
    AuthError, ClientError, ConnectionError, DispatchError, Result, TransportError,
    ValidationError,
};
pub use notification::{Category, Notification, TableLifecycleState};
pub use state::ConnectionState;
pub use wire::{DisconnectReason, TransportKind};
