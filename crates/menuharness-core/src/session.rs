//! Remote menu session.
//!
//! Owns the bus connections and the mirrors of one published menu and its
//! action groups. The session can be rebuilt in place, replacing every
//! connection and mirror while the owning matcher keeps its identity.
//!
//! Connections are opened on both the system and the session bus because
//! menu publishers may register on either.

use std::fmt;

use crate::{
    error::{ConnectionError, TransportError},
    model::{ActionGroups, SharedActionGroup, SharedMenu},
    params::ConnectionParameters,
};

/// Bus namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusKind {
    /// System-wide bus
    System,
    /// Per-user session bus
    Session,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Session => f.write_str("session"),
        }
    }
}

/// Message bus transport the session is built on.
///
/// Connection handles are reference counted: cloning shares the underlying
/// connection and it is released when the last clone drops, from any thread.
/// Connections must not terminate the process when the peer disconnects.
pub trait Transport: Send + Sync {
    /// Handle to an open bus connection.
    type Connection: Clone + Send + Sync;

    /// Resolve the address of the bus for `bus`.
    fn resolve_address(&self, bus: BusKind) -> Result<String, TransportError>;

    /// Open an authenticated message bus client connection to `address`.
    fn open(&self, bus: BusKind, address: &str) -> Result<Self::Connection, TransportError>;

    /// Mirror the menu model exported by `bus_name` at `object_path`.
    fn menu_model(
        &self,
        connection: &Self::Connection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedMenu, TransportError>;

    /// Mirror the action group exported by `bus_name` at `object_path`.
    fn action_group(
        &self,
        connection: &Self::Connection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedActionGroup, TransportError>;
}

/// Live connections and mirrors for one set of [`ConnectionParameters`].
pub struct RemoteMenuSession<T: Transport> {
    transport: T,
    parameters: ConnectionParameters,
    system: T::Connection,
    session: T::Connection,
    menu: SharedMenu,
    actions: ActionGroups,
    generation: u64,
}

impl<T: Transport> RemoteMenuSession<T> {
    /// Connect to both buses and mirror the menu and action groups.
    pub fn open(transport: T, parameters: ConnectionParameters) -> Result<Self, ConnectionError> {
        let system = connect(&transport, BusKind::System)?;
        let session = connect(&transport, BusKind::Session)?;
        let menu = mirror_menu(&transport, &session, &parameters)?;

        let mut actions = ActionGroups::new();
        for (label, object_path) in parameters.actions() {
            let group = mirror_actions(&transport, &session, &parameters, object_path)?;
            actions.insert(label.clone(), group);
        }

        tracing::debug!(
            bus_name = parameters.bus_name(),
            menu = parameters.menu_object_path(),
            action_groups = actions.len(),
            "menu session opened"
        );

        Ok(Self { transport, parameters, system, session, menu, actions, generation: 0 })
    }

    /// Acquire a fresh connection to `bus`.
    ///
    /// Failures are logged unless caused by cancellation.
    pub fn connect(&self, bus: BusKind) -> Result<T::Connection, ConnectionError> {
        connect(&self.transport, bus)
    }

    /// Replace every connection and mirror with fresh ones.
    ///
    /// Not atomic: if a step fails, the steps before it have already taken
    /// effect and their previous handles are released.
    pub fn rebuild(&mut self) -> Result<(), ConnectionError> {
        self.system = connect(&self.transport, BusKind::System)?;
        self.session = connect(&self.transport, BusKind::Session)?;
        self.menu = mirror_menu(&self.transport, &self.session, &self.parameters)?;

        for (label, object_path) in self.parameters.actions() {
            let group = mirror_actions(&self.transport, &self.session, &self.parameters, object_path)?;
            self.actions.insert(label.clone(), group);
        }

        self.generation += 1;
        tracing::debug!(generation = self.generation, "menu session rebuilt");

        Ok(())
    }

    /// Mirror of the menu.
    #[must_use]
    pub fn menu(&self) -> &SharedMenu {
        &self.menu
    }

    /// Action-group mirrors keyed by label.
    #[must_use]
    pub fn actions(&self) -> &ActionGroups {
        &self.actions
    }

    /// Current system bus connection.
    #[must_use]
    pub fn system_connection(&self) -> &T::Connection {
        &self.system
    }

    /// Current session bus connection.
    #[must_use]
    pub fn session_connection(&self) -> &T::Connection {
        &self.session
    }

    /// Parameters this session was opened with.
    #[must_use]
    pub fn parameters(&self) -> &ConnectionParameters {
        &self.parameters
    }

    /// Number of completed rebuilds.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> fmt::Debug for RemoteMenuSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMenuSession")
            .field("parameters", &self.parameters)
            .field("action_groups", &self.actions.keys().collect::<Vec<_>>())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

fn connect<T: Transport>(transport: &T, bus: BusKind) -> Result<T::Connection, ConnectionError> {
    let address = transport.resolve_address(bus).map_err(|err| match err {
        TransportError::Cancelled => ConnectionError::Cancelled { bus },
        TransportError::Failed(reason) => {
            tracing::warn!(%bus, %reason, "error getting the bus address");
            ConnectionError::Address { bus, reason }
        },
    })?;

    transport.open(bus, &address).map_err(|err| match err {
        TransportError::Cancelled => ConnectionError::Cancelled { bus },
        TransportError::Failed(reason) => {
            tracing::warn!(%bus, %address, %reason, "error getting the bus");
            ConnectionError::Connect { bus, reason }
        },
    })
}

fn mirror_menu<T: Transport>(
    transport: &T,
    session: &T::Connection,
    parameters: &ConnectionParameters,
) -> Result<SharedMenu, ConnectionError> {
    let object_path = parameters.menu_object_path();
    transport
        .menu_model(session, parameters.bus_name(), object_path)
        .map_err(|err| mirror_error(err, object_path))
}

fn mirror_actions<T: Transport>(
    transport: &T,
    session: &T::Connection,
    parameters: &ConnectionParameters,
    object_path: &str,
) -> Result<SharedActionGroup, ConnectionError> {
    transport
        .action_group(session, parameters.bus_name(), object_path)
        .map_err(|err| mirror_error(err, object_path))
}

fn mirror_error(err: TransportError, object_path: &str) -> ConnectionError {
    match err {
        TransportError::Cancelled => ConnectionError::Cancelled { bus: BusKind::Session },
        TransportError::Failed(reason) => {
            tracing::warn!(object_path, %reason, "error creating mirror");
            ConnectionError::Mirror { object_path: object_path.to_string(), reason }
        },
    }
}
