//! Menu harness
//!
//! Test-assertion harness for menus published over a message bus. A
//! [`MenuMatcher`] mirrors a remote menu model and its action groups, then
//! compares the mirror against an ordered list of [`ItemMatcher`]s, retrying
//! while the publisher is still catching up.
//!
//! # Architecture
//!
//! The retry logic is a pure state machine ([`MatchLoop`]) that takes time as
//! input; [`MenuMatcher`] drives it against a [`RemoteMenuSession`]. The clock
//! comes from an [`Environment`] and the bus from a [`Transport`], so the
//! whole loop runs deterministically under simulation.
//!
//! # Components
//!
//! - [`MenuMatcher`]: retry loop and result aggregation
//! - [`RemoteMenuSession`]: bus connections and remote mirrors
//! - [`MenuItemMatcher`]: declarative per-item expectations
//! - [`MatchResult`]: accumulated failures with location paths
//!
//! # Transport (optional)
//!
//! With the `dbus` feature enabled, [`dbus::DBusTransport`] mirrors
//! `org.gtk.Menus` and `org.gtk.Actions` objects over D-Bus.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
pub mod item;
pub mod matcher;
pub mod model;
pub mod params;
pub mod result;
pub mod session;

#[cfg(feature = "dbus")]
pub mod dbus;

pub use env::{Environment, SystemEnv};
pub use error::{ConnectionError, TransportError};
pub use item::{ItemMatcher, LinkKind, MenuItemMatcher};
pub use matcher::{MatchLoop, MatchOutcome, MatchState, MatcherConfig, MenuMatcher};
pub use model::{ActionGroup, ActionGroups, AttributeValue, MenuModel, SharedActionGroup, SharedMenu};
pub use params::ConnectionParameters;
pub use result::{Failure, MatchResult};
pub use session::{BusKind, RemoteMenuSession, Transport};
