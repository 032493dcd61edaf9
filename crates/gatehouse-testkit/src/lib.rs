//! Gatehouse Testing Infrastructure
//!
//! Deterministic implementations of every `gatehouse-core` effect trait, with
//! hooks for inspecting what the engine did and for injecting failures.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! gatehouse-testkit = { path = "../gatehouse-testkit" }
//! ```
//!
//! ```rust,no_run
//! use gatehouse_testkit::{ControllableClock, RecordingOutputs};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ControllableClock::new(0));
//! let outputs = Arc::new(RecordingOutputs::new());
//! clock.advance_ms(3_000);
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod hardware;
pub mod remote;
pub mod storage;
pub mod system;
pub mod time;

pub use hardware::{QueuedReader, RecordingOutputs, ScriptedInput};
pub use remote::MemoryRemote;
pub use storage::MemoryRegistryStorage;
pub use system::FixedSystemInfo;
pub use time::ControllableClock;
