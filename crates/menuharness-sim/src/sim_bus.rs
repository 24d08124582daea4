//! In-memory menu publisher.
//!
//! `SimBus` plays the publishing side of a desktop-shell menu: tests publish
//! menus and action groups under a bus name and object path, optionally
//! scheduling later updates on the virtual clock. Mirrors created through
//! [`SimTransport`](crate::SimTransport) read from it.
//!
//! Faults can be injected: one-shot address or connection failures, and
//! stale mirrors that never see the published menu. The latter reproduces the
//! initialization race the matcher's session rebuild works around.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use menuharness_core::{
    AttributeValue, BusKind, Environment, TransportError,
    model::{ATTRIBUTE_ACTION, ATTRIBUTE_ICON, ATTRIBUTE_LABEL, LINK_SECTION, LINK_SUBMENU},
};

use crate::sim_env::{SimEnv, SimInstant};

/// Published menu item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimItem {
    pub(crate) attributes: BTreeMap<String, AttributeValue>,
    pub(crate) links: BTreeMap<String, Vec<SimItem>>,
}

impl SimItem {
    /// Create an item without attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an item with a label.
    #[must_use]
    pub fn labelled(label: &str) -> Self {
        Self::new().label(label)
    }

    /// Set the label.
    #[must_use]
    pub fn label(self, label: &str) -> Self {
        self.attribute(ATTRIBUTE_LABEL, label)
    }

    /// Set the detailed action name.
    #[must_use]
    pub fn action(self, action: &str) -> Self {
        self.attribute(ATTRIBUTE_ACTION, action)
    }

    /// Set the serialized icon.
    #[must_use]
    pub fn icon(self, icon: &str) -> Self {
        self.attribute(ATTRIBUTE_ICON, icon)
    }

    /// Set an arbitrary attribute.
    #[must_use]
    pub fn attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Link a submenu.
    #[must_use]
    pub fn submenu(mut self, items: Vec<SimItem>) -> Self {
        self.links.insert(LINK_SUBMENU.to_string(), items);
        self
    }

    /// Link a section.
    #[must_use]
    pub fn section(mut self, items: Vec<SimItem>) -> Self {
        self.links.insert(LINK_SECTION.to_string(), items);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimAction {
    pub(crate) enabled: bool,
    pub(crate) state: Option<AttributeValue>,
}

/// Published action group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimActionGroup {
    pub(crate) actions: BTreeMap<String, SimAction>,
}

impl SimActionGroup {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled, stateless action.
    #[must_use]
    pub fn action(mut self, name: &str) -> Self {
        self.actions.insert(name.to_string(), SimAction { enabled: true, state: None });
        self
    }

    /// Add an action with an explicit enabled flag and state.
    #[must_use]
    pub fn stateful(mut self, name: &str, enabled: bool, state: impl Into<AttributeValue>) -> Self {
        self.actions
            .insert(name.to_string(), SimAction { enabled, state: Some(state.into()) });
        self
    }
}

/// (bus name, object path) of a published object.
pub(crate) type ObjectKey = (String, String);

#[derive(Debug, Default)]
pub(crate) struct PublishedMenu {
    pub(crate) items: Vec<SimItem>,
    pub(crate) revision: u64,
}

#[derive(Debug)]
struct ScheduledUpdate {
    at: SimInstant,
    key: ObjectKey,
    items: Vec<SimItem>,
}

/// Everything the simulated bus knows, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct BusState {
    pub(crate) menus: HashMap<ObjectKey, PublishedMenu>,
    pub(crate) action_groups: HashMap<ObjectKey, SimActionGroup>,
    scheduled: Vec<ScheduledUpdate>,
    pub(crate) stale_mirrors: usize,
    pub(crate) address_failures: HashMap<BusKind, VecDeque<TransportError>>,
    pub(crate) open_failures: HashMap<BusKind, VecDeque<TransportError>>,
    pub(crate) connections_opened: HashMap<BusKind, usize>,
    pub(crate) live_connections: usize,
    pub(crate) menu_mirrors: usize,
    pub(crate) action_mirrors: usize,
}

impl BusState {
    fn publish(&mut self, key: ObjectKey, items: Vec<SimItem>) {
        let menu = self.menus.entry(key).or_default();
        menu.items = items;
        menu.revision += 1;
    }

    /// Apply every scheduled update due at `now`, oldest first.
    pub(crate) fn apply_due(&mut self, now: SimInstant) {
        let due = self.scheduled.partition_point(|update| update.at <= now);
        let updates: Vec<_> = self.scheduled.drain(..due).collect();
        for update in updates {
            self.publish(update.key, update.items);
        }
    }

    /// Earliest pending update for `key`.
    pub(crate) fn next_update(&self, key: &ObjectKey) -> Option<SimInstant> {
        self.scheduled.iter().find(|update| update.key == *key).map(|update| update.at)
    }

    pub(crate) fn revision(&self, key: &ObjectKey) -> u64 {
        self.menus.get(key).map_or(0, |menu| menu.revision)
    }
}

/// Simulated message bus shared by the test and every mirror.
///
/// Clones share state and clock.
#[derive(Debug, Clone)]
pub struct SimBus {
    env: SimEnv,
    pub(crate) state: Arc<Mutex<BusState>>,
}

impl SimBus {
    /// Create an empty bus on `env`'s clock.
    #[must_use]
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::default() }
    }

    /// Clock driving this bus.
    #[must_use]
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `items` as the menu at `object_path` now.
    pub fn publish_menu(&self, bus_name: &str, object_path: &str, items: Vec<SimItem>) {
        let now = self.env.now();
        let mut state = self.lock();
        state.apply_due(now);
        state.publish(key(bus_name, object_path), items);
    }

    /// Publish `items` as the menu at `object_path` once `delay` has passed.
    pub fn publish_menu_after(
        &self,
        delay: Duration,
        bus_name: &str,
        object_path: &str,
        items: Vec<SimItem>,
    ) {
        let at = self.env.now() + delay;
        let mut state = self.lock();
        let position = state.scheduled.partition_point(|update| update.at <= at);
        state
            .scheduled
            .insert(position, ScheduledUpdate { at, key: key(bus_name, object_path), items });
    }

    /// Publish `group` as the action group at `object_path`.
    pub fn publish_actions(&self, bus_name: &str, object_path: &str, group: SimActionGroup) {
        self.lock().action_groups.insert(key(bus_name, object_path), group);
    }

    /// Make the next `count` menu mirrors stale: they stay empty forever and
    /// never report changes.
    pub fn stale_menu_mirrors(&self, count: usize) {
        self.lock().stale_mirrors = count;
    }

    /// Fail the next address resolution for `bus` with `err`.
    pub fn fail_next_address(&self, bus: BusKind, err: TransportError) {
        self.lock().address_failures.entry(bus).or_default().push_back(err);
    }

    /// Fail the next connection attempt to `bus` with `err`.
    pub fn fail_next_open(&self, bus: BusKind, err: TransportError) {
        self.lock().open_failures.entry(bus).or_default().push_back(err);
    }

    /// Connections opened to `bus` so far.
    #[must_use]
    pub fn connections_opened(&self, bus: BusKind) -> usize {
        self.lock().connections_opened.get(&bus).copied().unwrap_or_default()
    }

    /// Connections whose last handle has not been dropped yet.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.lock().live_connections
    }

    /// Menu mirrors created so far.
    #[must_use]
    pub fn menu_mirrors_created(&self) -> usize {
        self.lock().menu_mirrors
    }

    /// Action-group mirrors created so far.
    #[must_use]
    pub fn action_mirrors_created(&self) -> usize {
        self.lock().action_mirrors
    }
}

pub(crate) fn key(bus_name: &str, object_path: &str) -> ObjectKey {
    (bus_name.to_string(), object_path.to_string())
}
