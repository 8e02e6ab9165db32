//! # Engine Module
//!
//! Engine implementation behind the public API.
//!
//! This module contains the building blocks of the store:
//! - Identifiers, bitsets and the type registry
//! - Chunked column storage and archetypes
//! - The entity store and entity handles
//! - Queries and parallel query jobs
//! - Structural events, the event recorder, command buffers and dispatchers
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod bitset;
pub mod error;
pub mod component;
pub mod storage;
pub mod archetype;
pub mod entity;
pub mod events;
pub mod recorder;
pub mod store;
pub mod query;
pub mod scheduler;
pub mod commands;
pub mod dispatcher;
