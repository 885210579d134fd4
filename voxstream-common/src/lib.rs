//! # Voxstream Common Library
//!
//! Shared code for the voxstream crates:
//! - Error type used by configuration loading
//! - Identity and routing types (owners, recipients, broadcast channels)
//! - Stream event types and the broadcast `EventBus`
//! - Bootstrap configuration file resolution and TOML loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{BroadcastChannel, EventBus, OwnerId, RecipientId, StreamEvent};
