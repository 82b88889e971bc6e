//! Client library for the ArtUA marketplace backend: sign-in and session,
//! REST calls, the real-time chat hub and the messenger panel built on them.

pub mod api;
pub mod app;
pub mod error;
pub mod hub;
pub mod messenger;
pub mod session;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
