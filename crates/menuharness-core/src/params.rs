//! Connection parameters identifying a published menu.

use serde::{Deserialize, Serialize};

/// Where to find a published menu and its action groups.
///
/// Immutable once built. Action groups keep their insertion order; the label
/// is the prefix menu items use in their `action` attribute (`"indicator"` in
/// `"indicator.mute"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    bus_name: String,
    actions: Vec<(String, String)>,
    menu_object_path: String,
}

impl ConnectionParameters {
    /// Create parameters for the menu at `menu_object_path` owned by
    /// `bus_name`, with `actions` mapping labels to action-group object paths.
    pub fn new<I, L, P>(
        bus_name: impl Into<String>,
        actions: I,
        menu_object_path: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            bus_name: bus_name.into(),
            actions: actions.into_iter().map(|(l, p)| (l.into(), p.into())).collect(),
            menu_object_path: menu_object_path.into(),
        }
    }

    /// Bus name of the publishing service.
    #[must_use]
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Action-group label to object path mapping, in insertion order.
    #[must_use]
    pub fn actions(&self) -> &[(String, String)] {
        &self.actions
    }

    /// Object path of the menu model.
    #[must_use]
    pub fn menu_object_path(&self) -> &str {
        &self.menu_object_path
    }
}
