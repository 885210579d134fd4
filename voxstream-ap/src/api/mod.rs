//! HTTP control API
//!
//! Session control endpoints plus an SSE stream of `StreamEvent`s.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, run, AppContext};
