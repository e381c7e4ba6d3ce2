//! # vivarium-llm — Oracle Abstraction Layer for Vivarium
//!
//! Provides the behavior-oracle backends used to generate plans, dialogue
//! lines, and affect analyses:
//!   - **Ollama** (local)
//!   - **OpenAI-compatible API**
//!   - **None** — every call fails, which drives the engine's
//!     deterministic fallback paths
//!
//! All oracle calls flow through a priority queue drained by a bounded
//! worker pool, so dialogue requests (someone is waiting) jump ahead of
//! background summarisation, and the number of concurrent outbound calls
//! stays fixed regardless of how many agents want text in the same tick.
//!
//! Failures never propagate as errors past the [`service::OracleHandle`]:
//! they surface as reserved-prefix sentinel text, which the engine treats
//! uniformly as "no usable text".

pub mod affect;
pub mod client;
pub mod error;
pub mod prompt;
pub mod queue;
pub mod service;
pub mod types;

pub use client::{OracleClient, OracleProvider};
pub use error::OracleError;
pub use service::{OracleHandle, OracleService};
pub use types::{OracleRequest, OracleResponse};
