//! Gatehouse Effects - Production Handlers
//!
//! Layer 3 implementations of the `gatehouse-core` effect traits. Each
//! handler is a thin bridge to an operating-system facility; deterministic
//! doubles live in `gatehouse-testkit`.
//!
//! | Trait | Handler | Backing |
//! |---|---|---|
//! | `TimeEffects` | [`RealTimeHandler`] | `Instant` / system clock |
//! | `RegistryStorage` | [`FilesystemRegistryStorage`] | one JSON file per set |
//! | `RemoteEffects` | [`SpoolRemoteHandler`] | JSON tree on a spool directory |
//! | `OutputEffects`, `InputEffects` | [`SysfsGpioHandler`] | `/sys/class/gpio` |
//! | `CredentialReaderEffects` | [`LineReaderHandler`] | keyboard-wedge or FIFO lines |
//! | `SystemEffects` | [`SystemInfoHandler`] | `sysinfo`, `/proc/net/wireless` |

#![forbid(unsafe_code)]

pub mod gpio;
pub mod reader;
pub mod spool;
pub mod storage;
pub mod system;
pub mod time;

pub use gpio::{GpioPins, SysfsGpioHandler};
pub use reader::LineReaderHandler;
pub use spool::SpoolRemoteHandler;
pub use storage::FilesystemRegistryStorage;
pub use system::SystemInfoHandler;
pub use time::RealTimeHandler;
