//! Integration tests for the volume engine.
//!
//! Everything runs against in-memory mocks on paused tokio time, so whole
//! trading sessions complete instantly and deterministically.

mod lifecycle;
mod modes;
mod settlement;
