//! Simulated transport.
//!
//! [`SimTransport`] implements [`Transport`] on top of a [`SimBus`]. Menu
//! mirrors read the bus lazily, applying scheduled updates that have come due
//! on the virtual clock. Waiting for a change never blocks: the mirror jumps
//! the clock to the next scheduled update, or to the end of the timeout.
//!
//! Lock order is bus state, then clock.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use menuharness_core::{
    ActionGroup, AttributeValue, BusKind, Environment, MenuModel, SharedActionGroup, SharedMenu,
    Transport, TransportError,
};

use crate::sim_bus::{BusState, ObjectKey, SimBus, SimItem, key};

/// [`Transport`] backed by a [`SimBus`].
#[derive(Debug, Clone)]
pub struct SimTransport {
    bus: SimBus,
}

impl SimTransport {
    /// Create a transport onto `bus`.
    #[must_use]
    pub fn new(bus: &SimBus) -> Self {
        Self { bus: bus.clone() }
    }
}

/// Simulated bus connection.
///
/// Clones share the connection; it is released when the last clone drops.
#[derive(Clone)]
pub struct SimConnection(Arc<ConnectionHandle>);

struct ConnectionHandle {
    bus: BusKind,
    serial: usize,
    owner: SimBus,
}

impl SimConnection {
    /// Bus this connection was opened to.
    #[must_use]
    pub fn bus(&self) -> BusKind {
        self.0.bus
    }

    /// 1-based index among connections opened to the same bus.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.0.serial
    }
}

impl fmt::Debug for SimConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimConnection")
            .field("bus", &self.0.bus)
            .field("serial", &self.0.serial)
            .finish()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let mut state = self.owner.lock();
        state.live_connections = state.live_connections.saturating_sub(1);
        tracing::trace!(bus = %self.bus, serial = self.serial, "simulated connection released");
    }
}

impl Transport for SimTransport {
    type Connection = SimConnection;

    fn resolve_address(&self, bus: BusKind) -> Result<String, TransportError> {
        let mut state = self.bus.lock();
        if let Some(err) = state.address_failures.get_mut(&bus).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(format!("sim:bus={bus}"))
    }

    fn open(&self, bus: BusKind, address: &str) -> Result<SimConnection, TransportError> {
        let mut state = self.bus.lock();
        if let Some(err) = state.open_failures.get_mut(&bus).and_then(VecDeque::pop_front) {
            return Err(err);
        }

        let opened = state.connections_opened.entry(bus).or_default();
        *opened += 1;
        let serial = *opened;
        state.live_connections += 1;
        drop(state);

        tracing::trace!(%bus, address, serial, "simulated connection opened");
        Ok(SimConnection(Arc::new(ConnectionHandle { bus, serial, owner: self.bus.clone() })))
    }

    fn menu_model(
        &self,
        _connection: &SimConnection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedMenu, TransportError> {
        let key = key(bus_name, object_path);

        let mut state = self.bus.lock();
        state.menu_mirrors += 1;
        let stale = state.stale_mirrors > 0;
        if stale {
            state.stale_mirrors -= 1;
        }
        let observed = state.revision(&key);
        drop(state);

        if stale {
            tracing::trace!(bus_name, object_path, "simulated menu mirror is stale");
        }

        Ok(Arc::new(SimMenu {
            bus: self.bus.clone(),
            key,
            path: Vec::new(),
            stale,
            observed: AtomicU64::new(observed),
        }))
    }

    fn action_group(
        &self,
        _connection: &SimConnection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedActionGroup, TransportError> {
        self.bus.lock().action_mirrors += 1;
        Ok(Arc::new(SimActions { bus: self.bus.clone(), key: key(bus_name, object_path) }))
    }
}

/// Mirror of a published menu, or of a submenu or section within it.
struct SimMenu {
    bus: SimBus,
    key: ObjectKey,
    /// (item index, link name) hops from the root menu
    path: Vec<(usize, String)>,
    stale: bool,
    observed: AtomicU64,
}

impl SimMenu {
    fn with_items<R>(&self, f: impl FnOnce(&[SimItem]) -> R) -> R {
        if self.stale {
            return f(&[]);
        }

        let now = self.bus.env().now();
        let mut state = self.bus.lock();
        state.apply_due(now);
        self.observed.store(state.revision(&self.key), Ordering::SeqCst);

        f(resolve(&state, &self.key, &self.path).unwrap_or_default())
    }
}

fn resolve<'a>(
    state: &'a BusState,
    key: &ObjectKey,
    path: &[(usize, String)],
) -> Option<&'a [SimItem]> {
    let mut items = state.menus.get(key)?.items.as_slice();
    for (index, link) in path {
        items = items.get(*index)?.links.get(link)?.as_slice();
    }
    Some(items)
}

impl MenuModel for SimMenu {
    fn item_count(&self) -> usize {
        self.with_items(<[SimItem]>::len)
    }

    fn item_attribute(&self, index: usize, name: &str) -> Option<AttributeValue> {
        self.with_items(|items| items.get(index)?.attributes.get(name).cloned())
    }

    fn item_link(&self, index: usize, link: &str) -> Option<SharedMenu> {
        let linked = self.with_items(|items| {
            items.get(index).is_some_and(|item| item.links.contains_key(link))
        });
        if !linked {
            return None;
        }

        let mut path = self.path.clone();
        path.push((index, link.to_string()));

        Some(Arc::new(Self {
            bus: self.bus.clone(),
            key: self.key.clone(),
            path,
            stale: self.stale,
            observed: AtomicU64::new(self.observed.load(Ordering::SeqCst)),
        }))
    }

    fn wait_for_change(&self, timeout: Duration) -> bool {
        let env = self.bus.env();
        let now = env.now();
        let deadline = now + timeout;

        if self.stale {
            env.advance_to(deadline);
            return false;
        }

        let mut state = self.bus.lock();
        state.apply_due(now);
        if state.revision(&self.key) != self.observed.load(Ordering::SeqCst) {
            return true;
        }

        match state.next_update(&self.key) {
            Some(at) if at <= deadline => {
                env.advance_to(at);
                state.apply_due(at);
                true
            },
            _ => {
                env.advance_to(deadline);
                false
            },
        }
    }
}

/// Mirror of a published action group. Reads are always current.
struct SimActions {
    bus: SimBus,
    key: ObjectKey,
}

impl SimActions {
    fn with_action<R>(
        &self,
        name: &str,
        f: impl FnOnce(bool, Option<&AttributeValue>) -> R,
    ) -> Option<R> {
        let state = self.bus.lock();
        let action = state.action_groups.get(&self.key)?.actions.get(name)?;
        Some(f(action.enabled, action.state.as_ref()))
    }
}

impl ActionGroup for SimActions {
    fn has_action(&self, name: &str) -> bool {
        self.with_action(name, |_, _| ()).is_some()
    }

    fn is_enabled(&self, name: &str) -> Option<bool> {
        self.with_action(name, |enabled, _| enabled)
    }

    fn state(&self, name: &str) -> Option<AttributeValue> {
        self.with_action(name, |_, state| state.cloned()).flatten()
    }
}
