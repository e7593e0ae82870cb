//! Test infrastructure for the object-document mapper.
//!
//! Provides entity fixtures with their mapping declarations and a recording
//! search client that wraps the in-memory backend.

#![allow(dead_code)]

pub mod fixtures;
pub mod recording;

pub use fixtures::*;
pub use recording::*;
