//! # Vivarium Core Library
//!
//! World-agnostic foundation for the Vivarium agent simulation.
//!
//! Every agent in the world carries a mood (a five-key emotion
//! distribution), directed sympathy edges toward other agents, an
//! episodic memory log, and a point on a bounded 2D plane. This crate
//! owns the pure state machines and the persistence gateway; the tick
//! engine that drives them lives in `vivarium-engine`.
//!
//! ## Invariants enforced here
//!
//! - Mood distributions always sum to exactly 100 with no negative
//!   component ([`mood::Mood`]).
//! - Sympathy stays within \[-10, 10\]; reciprocal updates carry at most
//!   unit magnitude ([`sympathy`]).
//! - Motion targets are always inside (or projected into) a permitted
//!   zone rectangle ([`zones`]).

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod affect;
pub mod config;
pub mod embedding;
pub mod error;
pub mod lexicon;
pub mod memory;
pub mod mood;
pub mod oracle;
pub mod persistence;
pub mod retrieval;
pub mod sympathy;
pub mod types;
pub mod zones;

pub use config::VivariumConfig;
pub use error::VivariumError;
pub use mood::Mood;
pub use types::*;
