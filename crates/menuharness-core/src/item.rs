//! Per-item expectations.
//!
//! [`ItemMatcher`] is the capability the menu matcher calls into for each
//! expected item. [`MenuItemMatcher`] is the declarative implementation most
//! tests use: a builder of attribute, action and link expectations that may
//! nest for submenus and sections.

use crate::{
    model::{
        ATTRIBUTE_ACTION, ATTRIBUTE_ICON, ATTRIBUTE_LABEL, ActionGroups, AttributeValue,
        LINK_SECTION, LINK_SUBMENU, SharedMenu,
    },
    result::MatchResult,
};

/// Compares one remote menu item against expectations.
///
/// Implementations record discrepancies in `result` under
/// `location + [index]`. They must not modify remote state and must be
/// deterministic for a given remote snapshot.
pub trait ItemMatcher<I>: Send + Sync {
    /// Match the item at `index` of `menu`.
    fn match_item(
        &self,
        result: &mut MatchResult<I>,
        location: &[usize],
        menu: &SharedMenu,
        actions: &ActionGroups,
        index: usize,
    );
}

/// Kind of link a matcher follows to reach its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Item opens a submenu
    Submenu,
    /// Item is a section grouping further items
    Section,
}

impl LinkKind {
    fn link_name(self) -> &'static str {
        match self {
            Self::Submenu => LINK_SUBMENU,
            Self::Section => LINK_SECTION,
        }
    }
}

/// Declarative expectations for a single menu item.
///
/// Only configured expectations are checked; an empty matcher accepts any
/// item.
#[derive(Debug, Clone, Default)]
pub struct MenuItemMatcher {
    attributes: Vec<(String, AttributeValue)>,
    action: Option<String>,
    enabled: Option<bool>,
    state: Option<AttributeValue>,
    link: Option<LinkKind>,
    children: Vec<MenuItemMatcher>,
}

impl MenuItemMatcher {
    /// Create a matcher with no expectations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the item's label.
    #[must_use]
    pub fn label(self, label: impl Into<String>) -> Self {
        self.attribute(ATTRIBUTE_LABEL, AttributeValue::String(label.into()))
    }

    /// Expect the item's serialized icon.
    #[must_use]
    pub fn icon(self, icon: impl Into<String>) -> Self {
        self.attribute(ATTRIBUTE_ICON, AttributeValue::String(icon.into()))
    }

    /// Expect the item's detailed action name, e.g. `"indicator.mute"`.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        self.attributes.push((ATTRIBUTE_ACTION.to_string(), AttributeValue::String(action.clone())));
        self.action = Some(action);
        self
    }

    /// Expect an arbitrary attribute value.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Expect the item's action to be enabled (or disabled).
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Expect the item's action state.
    #[must_use]
    pub fn state(mut self, state: impl Into<AttributeValue>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Expect the item to link to a submenu.
    #[must_use]
    pub fn submenu(mut self) -> Self {
        self.link = Some(LinkKind::Submenu);
        self
    }

    /// Expect the item to be a section.
    #[must_use]
    pub fn section(mut self) -> Self {
        self.link = Some(LinkKind::Section);
        self
    }

    /// Append an expected child of the linked submenu or section.
    ///
    /// Implies [`submenu`](Self::submenu) unless a link kind was already set.
    #[must_use]
    pub fn item(mut self, child: MenuItemMatcher) -> Self {
        if self.link.is_none() {
            self.link = Some(LinkKind::Submenu);
        }
        self.children.push(child);
        self
    }

    fn match_attributes<I>(
        &self,
        result: &mut MatchResult<I>,
        here: &[usize],
        menu: &SharedMenu,
        index: usize,
    ) where
        I: Copy + Ord,
    {
        for (name, expected) in &self.attributes {
            match menu.item_attribute(index, name) {
                Some(found) if found == *expected => {},
                Some(found) => result
                    .failure(here, format!("Expected {name} {expected} but found {found}")),
                None => result.failure(here, format!("Expected {name} {expected} but none found")),
            }
        }
    }

    fn match_action<I>(&self, result: &mut MatchResult<I>, here: &[usize], actions: &ActionGroups)
    where
        I: Copy + Ord,
    {
        if self.enabled.is_none() && self.state.is_none() {
            return;
        }

        let Some(action) = &self.action else {
            result.failure(here, "Action expectations require an action name");
            return;
        };

        let Some((prefix, name)) = action.split_once('.') else {
            result.failure(here, format!("Action '{action}' has no group prefix"));
            return;
        };

        let Some(group) = actions.get(prefix) else {
            result.failure(here, format!("Action group '{prefix}' not found"));
            return;
        };

        if !group.has_action(name) {
            result.failure(here, format!("Action '{name}' not found in group '{prefix}'"));
            return;
        }

        if let Some(expected) = self.enabled
            && group.is_enabled(name) != Some(expected)
        {
            let word = if expected { "enabled" } else { "disabled" };
            result.failure(here, format!("Expected action '{action}' to be {word}"));
        }

        if let Some(expected) = &self.state {
            match group.state(name) {
                Some(found) if found == *expected => {},
                Some(found) => result.failure(
                    here,
                    format!("Expected action '{action}' state {expected} but found {found}"),
                ),
                None => result
                    .failure(here, format!("Expected action '{action}' state {expected} but none found")),
            }
        }
    }

    fn match_children<I>(
        &self,
        result: &mut MatchResult<I>,
        here: &[usize],
        menu: &SharedMenu,
        actions: &ActionGroups,
        index: usize,
    ) where
        I: Copy + Ord,
    {
        let Some(kind) = self.link else {
            return;
        };

        let Some(linked) = menu.item_link(index, kind.link_name()) else {
            result.failure(here, format!("Expected {} but none found", kind.link_name()));
            return;
        };

        let found = linked.item_count();
        if self.children.len() > found {
            result.failure(
                here,
                format!(
                    "Row count mismatch, expected {} but found {found}",
                    self.children.len()
                ),
            );
            return;
        }

        for (child_index, child) in self.children.iter().enumerate() {
            child.match_item(result, here, &linked, actions, child_index);
        }
    }
}

impl<I> ItemMatcher<I> for MenuItemMatcher
where
    I: Copy + Ord,
{
    fn match_item(
        &self,
        result: &mut MatchResult<I>,
        location: &[usize],
        menu: &SharedMenu,
        actions: &ActionGroups,
        index: usize,
    ) {
        let mut here = location.to_vec();
        here.push(index);

        self.match_attributes(result, &here, menu, index);
        self.match_action(result, &here, actions);
        self.match_children(result, &here, menu, actions, index);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashMap},
        sync::Arc,
        time::Duration,
    };

    use super::*;
    use crate::model::{ActionGroup, MenuModel};

    #[derive(Default)]
    struct StaticItem {
        attributes: HashMap<&'static str, AttributeValue>,
        links: HashMap<&'static str, SharedMenu>,
    }

    struct StaticMenu(Vec<StaticItem>);

    impl MenuModel for StaticMenu {
        fn item_count(&self) -> usize {
            self.0.len()
        }

        fn item_attribute(&self, index: usize, name: &str) -> Option<AttributeValue> {
            self.0.get(index)?.attributes.get(name).cloned()
        }

        fn item_link(&self, index: usize, link: &str) -> Option<SharedMenu> {
            self.0.get(index)?.links.get(link).cloned()
        }

        fn wait_for_change(&self, _timeout: Duration) -> bool {
            false
        }
    }

    struct StaticActions(BTreeMap<&'static str, (bool, Option<AttributeValue>)>);

    impl ActionGroup for StaticActions {
        fn has_action(&self, name: &str) -> bool {
            self.0.contains_key(name)
        }

        fn is_enabled(&self, name: &str) -> Option<bool> {
            self.0.get(name).map(|(enabled, _)| *enabled)
        }

        fn state(&self, name: &str) -> Option<AttributeValue> {
            self.0.get(name).and_then(|(_, state)| state.clone())
        }
    }

    fn labelled(label: &str) -> StaticItem {
        let mut item = StaticItem::default();
        item.attributes.insert(ATTRIBUTE_LABEL, label.into());
        item
    }

    fn run(matcher: &MenuItemMatcher, menu: SharedMenu, actions: &ActionGroups) -> MatchResult<u64> {
        let mut result = MatchResult::new(0);
        matcher.match_item(&mut result, &[], &menu, actions, 0);
        result
    }

    #[test]
    fn matching_label_succeeds() {
        let menu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Mute")]));
        let result = run(&MenuItemMatcher::new().label("Mute"), menu, &ActionGroups::new());

        assert!(result.success());
    }

    #[test]
    fn label_mismatch_names_both_values() {
        let menu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Volume")]));
        let result = run(&MenuItemMatcher::new().label("Mute"), menu, &ActionGroups::new());

        assert_eq!(result.failures().len(), 1);
        assert_eq!(result.failures()[0].location, vec![0]);
        assert_eq!(result.failures()[0].message, "Expected label 'Mute' but found 'Volume'");
    }

    #[test]
    fn missing_attribute_is_reported() {
        let menu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Mute")]));
        let result = run(&MenuItemMatcher::new().icon("audio-volume-muted"), menu, &ActionGroups::new());

        assert_eq!(
            result.failures()[0].message,
            "Expected icon 'audio-volume-muted' but none found"
        );
    }

    #[test]
    fn nested_failure_location_includes_parent_index() {
        let submenu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Low"), labelled("High")]));
        let mut parent = labelled("Brightness");
        parent.links.insert(LINK_SUBMENU, submenu);
        let menu: SharedMenu = Arc::new(StaticMenu(vec![parent]));

        let matcher = MenuItemMatcher::new()
            .label("Brightness")
            .item(MenuItemMatcher::new().label("Low"))
            .item(MenuItemMatcher::new().label("Medium"));

        let result = run(&matcher, menu, &ActionGroups::new());

        assert_eq!(result.failures().len(), 1);
        assert_eq!(result.failures()[0].location, vec![0, 1]);
    }

    #[test]
    fn submenu_row_count_mismatch_short_circuits() {
        let submenu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Low")]));
        let mut parent = labelled("Brightness");
        parent.links.insert(LINK_SUBMENU, submenu);
        let menu: SharedMenu = Arc::new(StaticMenu(vec![parent]));

        let matcher = MenuItemMatcher::new()
            .item(MenuItemMatcher::new().label("Wrong"))
            .item(MenuItemMatcher::new().label("High"));

        let result = run(&matcher, menu, &ActionGroups::new());

        assert_eq!(result.failures().len(), 1);
        assert_eq!(result.failures()[0].location, vec![0]);
        assert_eq!(result.failures()[0].message, "Row count mismatch, expected 2 but found 1");
    }

    #[test]
    fn missing_section_link_is_reported() {
        let menu: SharedMenu = Arc::new(StaticMenu(vec![labelled("Mute")]));
        let matcher = MenuItemMatcher::new().section().item(MenuItemMatcher::new());

        let result = run(&matcher, menu, &ActionGroups::new());

        assert_eq!(result.failures()[0].message, "Expected section but none found");
    }

    #[test]
    fn action_enabled_and_state_are_checked() {
        let mut item = labelled("Mute");
        item.attributes.insert(ATTRIBUTE_ACTION, "indicator.mute".into());
        let menu: SharedMenu = Arc::new(StaticMenu(vec![item]));

        let mut actions = ActionGroups::new();
        actions.insert(
            "indicator".to_string(),
            Arc::new(StaticActions(BTreeMap::from([("mute", (false, Some(true.into())))]))),
        );

        let matcher = MenuItemMatcher::new().action("indicator.mute").enabled(true).state(false);
        let result = run(&matcher, menu, &actions);

        let messages: Vec<_> = result.failures().iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec![
            "Expected action 'indicator.mute' to be enabled",
            "Expected action 'indicator.mute' state false but found true",
        ]);
    }

    #[test]
    fn unknown_action_group_is_reported() {
        let mut item = labelled("Mute");
        item.attributes.insert(ATTRIBUTE_ACTION, "app.mute".into());
        let menu: SharedMenu = Arc::new(StaticMenu(vec![item]));

        let matcher = MenuItemMatcher::new().action("app.mute").enabled(true);
        let result = run(&matcher, menu, &ActionGroups::new());

        assert_eq!(result.failures()[0].message, "Action group 'app' not found");
    }
}
