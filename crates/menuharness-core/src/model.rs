//! Read-only mirrors of remotely published menus and action groups.
//!
//! These traits are the seam between the matching engine and whatever
//! transport carries the menu. The D-Bus backend and the simulation harness
//! both implement them; item matchers only ever see `dyn` handles.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use serde::Serialize;

/// Attribute holding an item's label.
pub const ATTRIBUTE_LABEL: &str = "label";

/// Attribute holding an item's detailed action name (`"<group>.<action>"`).
pub const ATTRIBUTE_ACTION: &str = "action";

/// Attribute holding an item's serialized icon.
pub const ATTRIBUTE_ICON: &str = "icon";

/// Link to a submenu.
pub const LINK_SUBMENU: &str = "submenu";

/// Link to a section.
pub const LINK_SECTION: &str = "section";

/// Transport-neutral value of an item attribute or action state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue {
    /// Boolean
    Bool(bool),
    /// Signed integer of any width
    Int(i64),
    /// Unsigned integer of any width
    UInt(u64),
    /// Double precision float
    Double(f64),
    /// String (also object paths and signatures)
    String(String),
    /// Anything else, rendered for diagnostics
    Other(String),
}

impl AttributeValue {
    /// String content, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Other(o) => f.write_str(o),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Local mirror of a remotely published menu.
///
/// Mirrors are eventually consistent: right after creation, or while the
/// publisher is mid-update, they may show a partial tree.
pub trait MenuModel: Send + Sync {
    /// Number of items currently mirrored.
    fn item_count(&self) -> usize;

    /// Attribute `name` of the item at `index`, if both exist.
    fn item_attribute(&self, index: usize, name: &str) -> Option<AttributeValue>;

    /// Linked menu `link` (e.g. [`LINK_SUBMENU`]) of the item at `index`.
    fn item_link(&self, index: usize, link: &str) -> Option<SharedMenu>;

    /// Block until the menu signals a structural change or `timeout` elapses.
    ///
    /// Returns `true` if a change was observed. Never blocks longer than
    /// `timeout`.
    fn wait_for_change(&self, timeout: Duration) -> bool;
}

/// Local mirror of a remotely published action group.
pub trait ActionGroup: Send + Sync {
    /// Whether the group exports `name`.
    fn has_action(&self, name: &str) -> bool;

    /// Enabled flag of `name`. `None` if the action does not exist.
    fn is_enabled(&self, name: &str) -> Option<bool>;

    /// Current state of `name`. `None` if stateless or missing.
    fn state(&self, name: &str) -> Option<AttributeValue>;
}

/// Shared handle to a menu mirror.
pub type SharedMenu = Arc<dyn MenuModel>;

/// Shared handle to an action-group mirror.
pub type SharedActionGroup = Arc<dyn ActionGroup>;

/// Action-group mirrors keyed by their label.
pub type ActionGroups = BTreeMap<String, SharedActionGroup>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_strings_only() {
        assert_eq!(AttributeValue::from("Mute").to_string(), "'Mute'");
        assert_eq!(AttributeValue::from(true).to_string(), "true");
        assert_eq!(AttributeValue::from(-3i32).to_string(), "-3");
        assert_eq!(AttributeValue::from(7u32).to_string(), "7");
        assert_eq!(AttributeValue::Other("(1, 2)".to_string()).to_string(), "(1, 2)");
    }

    #[test]
    fn integer_widths_normalize() {
        assert_eq!(AttributeValue::from(5i32), AttributeValue::from(5i64));
        assert_eq!(AttributeValue::from(5u32), AttributeValue::from(5u64));
        assert_ne!(AttributeValue::from(5i32), AttributeValue::from(5u32));
    }

    #[test]
    fn as_str_only_for_strings() {
        assert_eq!(AttributeValue::from("x").as_str(), Some("x"));
        assert_eq!(AttributeValue::from(1.5).as_str(), None);
    }
}
