//! Layer 1: Core Effect Trait Definitions
//!
//! Pure trait definitions for every side effect the node performs. This
//! module defines **what** effects can be performed; handlers define **how**.
//!
//! # Effect Classification
//!
//! ## Infrastructure Effects (Layer 3: `gatehouse-effects`)
//! - **Time**, **Remote**, **Hardware**, **System**, **Storage**
//!
//! ## Testing Effects (Layer 8: `gatehouse-testkit`)
//! - Controllable clock, in-memory remote tree, scripted pins
//!
//! Everything called from the latency-sensitive context (time, hardware,
//! storage) is synchronous and must not block beyond a single local write.
//! Only `RemoteEffects` is async; it is called exclusively from the
//! network context.

pub mod hardware;
pub mod remote;
pub mod storage;
pub mod system;
pub mod time;

pub use hardware::{CredentialReaderEffects, InputEffects, Output, OutputEffects};
pub use remote::RemoteEffects;
pub use storage::{RegistryStorage, SetEntries};
pub use system::SystemEffects;
pub use time::TimeEffects;
