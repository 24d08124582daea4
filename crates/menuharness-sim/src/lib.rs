//! Deterministic simulation harness for menu matching.
//!
//! In-memory implementations of the [`Environment`](menuharness_core::Environment)
//! and [`Transport`](menuharness_core::Transport) traits. Tests publish menus on
//! a [`SimBus`], schedule updates on its virtual clock and inject faults, then
//! run a real [`MenuMatcher`](menuharness_core::MenuMatcher) against it. Every
//! run is reproducible and never sleeps.
//!
//! # Fault Injection
//!
//! - one-shot address or connection failures, including cancellation
//! - stale menu mirrors that never see the published menu, forcing the
//!   matcher to rebuild its session

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_bus;
pub mod sim_env;
pub mod sim_transport;

pub use sim_bus::{SimActionGroup, SimBus, SimItem};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_transport::{SimConnection, SimTransport};
