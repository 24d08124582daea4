//! D-Bus transport.
//!
//! Mirrors `org.gtk.Menus` and `org.gtk.Actions` objects using zbus' blocking
//! API. The menu mirror subscribes to the exported menu groups with `Start`,
//! applies `Changed` signals on a background thread and wakes
//! [`MenuModel::wait_for_change`] callers through a condition variable. When
//! the last handle to a mirror drops, its subscriptions are ended with `End`
//! and the listener thread stops, releasing its hold on the connection.
//!
//! zbus connections never exit the process when the bus goes away, so no
//! extra setup is needed for that.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak},
    thread,
    time::Duration,
};

use futures::{
    Stream, StreamExt,
    channel::oneshot,
    executor::block_on,
    future::{self, Either},
};
use zbus::{
    Address, Message,
    blocking::{Connection, Proxy, connection::Builder},
    proxy::SignalStream,
    zvariant::{OwnedValue, Signature, Value},
};

use crate::{
    error::TransportError,
    model::{ActionGroup, AttributeValue, MenuModel, SharedActionGroup, SharedMenu},
    session::{BusKind, Transport},
};

const MENUS_INTERFACE: &str = "org.gtk.Menus";
const ACTIONS_INTERFACE: &str = "org.gtk.Actions";

/// (group, menu) pair identifying a menu within an exported menu model.
type MenuKey = (u32, u32);

/// Item as exported on the wire: attributes plus `:`-prefixed links.
type RawItem = HashMap<String, OwnedValue>;

/// `Changed` signal entry: group, menu, position, removed count, added items.
type MenuChange = (u32, u32, u32, u32, Vec<RawItem>);

/// Transport over the real system and session buses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DBusTransport;

impl Transport for DBusTransport {
    type Connection = Connection;

    fn resolve_address(&self, bus: BusKind) -> Result<String, TransportError> {
        let address = match bus {
            BusKind::System => Address::system(),
            BusKind::Session => Address::session(),
        }
        .map_err(classify)?;

        Ok(address.to_string())
    }

    fn open(&self, _bus: BusKind, address: &str) -> Result<Connection, TransportError> {
        Builder::address(address).and_then(Builder::build).map_err(classify)
    }

    fn menu_model(
        &self,
        connection: &Connection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedMenu, TransportError> {
        let menu = DBusMenuModel::connect(connection, bus_name, object_path).map_err(classify)?;
        Ok(Arc::new(menu))
    }

    fn action_group(
        &self,
        connection: &Connection,
        bus_name: &str,
        object_path: &str,
    ) -> Result<SharedActionGroup, TransportError> {
        let group =
            DBusActionGroup::connect(connection, bus_name, object_path).map_err(classify)?;
        Ok(Arc::new(group))
    }
}

fn classify(err: zbus::Error) -> TransportError {
    match &err {
        zbus::Error::InputOutput(io) if io.kind() == io::ErrorKind::Interrupted => {
            TransportError::Cancelled
        },
        _ => TransportError::Failed(err.to_string()),
    }
}

#[derive(Debug, Default)]
struct MenuItem {
    attributes: BTreeMap<String, AttributeValue>,
    links: BTreeMap<String, MenuKey>,
}

#[derive(Debug, Default)]
struct MenuCache {
    menus: HashMap<MenuKey, Vec<MenuItem>>,
    groups: HashSet<u32>,
    revision: u64,
}

impl MenuCache {
    /// Replace `removed` items of menu `key`, starting at `position`, with
    /// `added`. Position and count are clamped to the menu's length.
    fn splice(&mut self, key: MenuKey, position: usize, removed: usize, added: Vec<MenuItem>) {
        let items = self.menus.entry(key).or_default();
        let start = position.min(items.len());
        let end = start.saturating_add(removed).min(items.len());
        items.splice(start..end, added);
    }
}

/// Shared state of one exported menu model.
struct Subscription {
    proxy: Proxy<'static>,
    cache: Mutex<MenuCache>,
    changed: Condvar,
    /// Dropping it stops the listener thread
    _stop: oneshot::Sender<()>,
}

impl Subscription {
    fn lock(&self) -> MutexGuard<'_, MenuCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, group: u32) -> zbus::Result<()> {
        if self.lock().groups.contains(&group) {
            return Ok(());
        }

        let menus: Vec<(u32, u32, Vec<RawItem>)> = self.proxy.call("Start", &(vec![group],))?;

        let mut cache = self.lock();
        cache.groups.insert(group);
        for (group, menu, items) in menus {
            cache.menus.insert((group, menu), items.into_iter().map(parse_item).collect());
        }
        cache.revision += 1;
        drop(cache);

        self.changed.notify_all();
        Ok(())
    }

    fn apply(&self, changes: Vec<MenuChange>) {
        let mut cache = self.lock();
        for (group, menu, position, removed, added) in changes {
            let added = added.into_iter().map(parse_item).collect();
            cache.splice((group, menu), position as usize, removed as usize, added);
        }
        cache.revision += 1;
        drop(cache);

        self.changed.notify_all();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let groups: Vec<u32> = self.lock().groups.iter().copied().collect();
        if groups.is_empty() {
            return;
        }

        if let Err(err) = self.proxy.call_noreply("End", &(groups,)) {
            tracing::debug!(%err, "failed to end menu subscription");
        }
    }
}

fn listen(
    subscription: &Weak<Subscription>,
    signals: SignalStream<'static>,
    stop: oneshot::Receiver<()>,
) {
    block_on(forward_until_stopped(signals, stop, |message: Message| {
        let Some(subscription) = subscription.upgrade() else {
            return false;
        };

        match message.body().deserialize::<Vec<MenuChange>>() {
            Ok(changes) => subscription.apply(changes),
            Err(err) => tracing::debug!(%err, "ignoring malformed menu change"),
        }
        true
    }));
    tracing::trace!("menu change listener stopped");
}

/// Hand each item of `signals` to `deliver` until the stream ends, `deliver`
/// returns false, or `stop` fires or is dropped.
async fn forward_until_stopped<S>(
    signals: S,
    mut stop: oneshot::Receiver<()>,
    mut deliver: impl FnMut(S::Item) -> bool,
) where
    S: Stream,
{
    let mut signals = std::pin::pin!(signals);
    loop {
        match future::select(signals.next(), &mut stop).await {
            Either::Left((Some(item), _)) => {
                if !deliver(item) {
                    break;
                }
            },
            Either::Left((None, _)) | Either::Right(_) => break,
        }
    }
}

/// Mirror of one menu within an exported `org.gtk.Menus` model.
///
/// Submenus and sections share their root's subscription and cache.
pub struct DBusMenuModel {
    subscription: Arc<Subscription>,
    key: MenuKey,
}

impl DBusMenuModel {
    /// Mirror the root menu exported by `bus_name` at `object_path`.
    pub fn connect(
        connection: &Connection,
        bus_name: &str,
        object_path: &str,
    ) -> zbus::Result<Self> {
        let proxy =
            Proxy::new(connection, bus_name.to_string(), object_path.to_string(), MENUS_INTERFACE)?;
        // Match rule goes in before `Start` so no change in between is lost
        let signals = block_on(proxy.inner().receive_signal("Changed"))?;
        let (stop, stopped) = oneshot::channel();

        let subscription = Arc::new(Subscription {
            proxy,
            cache: Mutex::default(),
            changed: Condvar::new(),
            _stop: stop,
        });
        subscription.subscribe(0)?;

        let weak = Arc::downgrade(&subscription);
        thread::Builder::new()
            .name("menu-changes".to_string())
            .spawn(move || listen(&weak, signals, stopped))
            .map_err(zbus::Error::from)?;

        Ok(Self { subscription, key: (0, 0) })
    }
}

impl MenuModel for DBusMenuModel {
    fn item_count(&self) -> usize {
        self.subscription.lock().menus.get(&self.key).map_or(0, Vec::len)
    }

    fn item_attribute(&self, index: usize, name: &str) -> Option<AttributeValue> {
        self.subscription.lock().menus.get(&self.key)?.get(index)?.attributes.get(name).cloned()
    }

    fn item_link(&self, index: usize, link: &str) -> Option<SharedMenu> {
        let key = *self.subscription.lock().menus.get(&self.key)?.get(index)?.links.get(link)?;

        if let Err(err) = self.subscription.subscribe(key.0) {
            tracing::debug!(%err, group = key.0, "failed to subscribe to linked menu");
            return None;
        }

        Some(Arc::new(Self { subscription: Arc::clone(&self.subscription), key }))
    }

    fn wait_for_change(&self, timeout: Duration) -> bool {
        let cache = self.subscription.lock();
        let revision = cache.revision;

        let (cache, _) = self
            .subscription
            .changed
            .wait_timeout_while(cache, timeout, |cache| cache.revision == revision)
            .unwrap_or_else(PoisonError::into_inner);

        cache.revision != revision
    }
}

/// Mirror of an exported `org.gtk.Actions` group.
pub struct DBusActionGroup {
    proxy: Proxy<'static>,
}

impl DBusActionGroup {
    /// Mirror the action group exported by `bus_name` at `object_path`.
    pub fn connect(
        connection: &Connection,
        bus_name: &str,
        object_path: &str,
    ) -> zbus::Result<Self> {
        let proxy = Proxy::new(
            connection,
            bus_name.to_string(),
            object_path.to_string(),
            ACTIONS_INTERFACE,
        )?;
        Ok(Self { proxy })
    }

    fn describe(&self, name: &str) -> Option<(bool, Vec<OwnedValue>)> {
        let reply: zbus::Result<(bool, Signature, Vec<OwnedValue>)> =
            self.proxy.call("Describe", &(name,));

        match reply {
            Ok((enabled, _, state)) => Some((enabled, state)),
            Err(err) => {
                tracing::debug!(name, %err, "action not described");
                None
            },
        }
    }
}

impl ActionGroup for DBusActionGroup {
    fn has_action(&self, name: &str) -> bool {
        let reply: zbus::Result<Vec<String>> = self.proxy.call("List", &());
        reply.is_ok_and(|actions| actions.iter().any(|action| action == name))
    }

    fn is_enabled(&self, name: &str) -> Option<bool> {
        self.describe(name).map(|(enabled, _)| enabled)
    }

    fn state(&self, name: &str) -> Option<AttributeValue> {
        let (_, state) = self.describe(name)?;
        state.first().map(|value| attribute_value(value))
    }
}

fn parse_item(raw: RawItem) -> MenuItem {
    let mut item = MenuItem::default();
    for (key, value) in raw {
        if let Some(link) = key.strip_prefix(':') {
            if let Some(target) = link_target(&value) {
                item.links.insert(link.to_string(), target);
            }
        } else {
            item.attributes.insert(key, attribute_value(&value));
        }
    }
    item
}

fn link_target(value: &Value<'_>) -> Option<MenuKey> {
    match value {
        Value::Structure(fields) => match fields.fields() {
            [Value::U32(group), Value::U32(menu)] => Some((*group, *menu)),
            _ => None,
        },
        _ => None,
    }
}

fn attribute_value(value: &Value<'_>) -> AttributeValue {
    match value {
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::I16(i) => AttributeValue::Int(i64::from(*i)),
        Value::I32(i) => AttributeValue::Int(i64::from(*i)),
        Value::I64(i) => AttributeValue::Int(*i),
        Value::U8(u) => AttributeValue::UInt(u64::from(*u)),
        Value::U16(u) => AttributeValue::UInt(u64::from(*u)),
        Value::U32(u) => AttributeValue::UInt(u64::from(*u)),
        Value::U64(u) => AttributeValue::UInt(*u),
        Value::F64(d) => AttributeValue::Double(*d),
        Value::Str(s) => AttributeValue::String(s.as_str().to_string()),
        Value::ObjectPath(p) => AttributeValue::String(p.as_str().to_string()),
        Value::Value(inner) => attribute_value(inner),
        other => AttributeValue::Other(format!("{other:?}")),
    }
}
