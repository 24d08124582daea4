//! Property-based tests for the menu matcher.

mod common;

use std::time::Duration;

use common::{BUS_NAME, Fixture, MENU_PATH, labels};
use menuharness_core::{Failure, MatcherConfig, MenuItemMatcher};
use menuharness_sim::SimItem;
use proptest::prelude::*;

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("item {i}")).collect()
}

fn published(count: usize) -> Vec<SimItem> {
    labels(&names(count).iter().map(String::as_str).collect::<Vec<_>>())
}

fn short_config() -> MatcherConfig {
    MatcherConfig { match_timeout: Duration::from_secs(1), ..MatcherConfig::default() }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Too few published rows produce exactly one root failure, never
    /// per-item failures.
    #[test]
    fn too_few_rows_is_single_root_failure(expected in 1usize..8, missing in 1usize..8) {
        let found = expected.saturating_sub(missing);
        let fixture = Fixture::new();
        fixture.publish(published(found));

        let mut matcher = fixture.matcher_with(short_config());
        for name in names(expected) {
            matcher = matcher.item(MenuItemMatcher::new().label(name));
        }
        let result = matcher.match_menu().unwrap();

        prop_assert_eq!(result.failures(), &[Failure {
            location: vec![],
            message: format!("Row count mismatch, expected {expected} but found {found}"),
        }]);
    }

    /// A prefix of the published menu matches on the first attempt.
    #[test]
    fn published_prefix_matches_immediately(published_count in 0usize..8, extra in 0usize..4) {
        let fixture = Fixture::new();
        fixture.publish(published(published_count + extra));

        let mut matcher = fixture.matcher();
        for name in names(published_count) {
            matcher = matcher.item(MenuItemMatcher::new().label(name));
        }
        let result = matcher.match_menu().unwrap();

        prop_assert!(result.success());
        prop_assert_eq!(fixture.env.elapsed(), Duration::ZERO);
    }

    /// Matching never runs past the match deadline, whatever the publisher
    /// does.
    #[test]
    fn matching_ends_by_deadline(delay_ms in 0u64..3_000, expected in 0usize..4) {
        let fixture = Fixture::new();
        fixture.publish(published(1));
        fixture.bus.publish_menu_after(
            Duration::from_millis(delay_ms),
            BUS_NAME,
            MENU_PATH,
            published(2),
        );

        let mut matcher = fixture.matcher_with(short_config());
        for name in names(expected) {
            matcher = matcher.item(MenuItemMatcher::new().label(name));
        }
        let result = matcher.match_menu().unwrap();

        prop_assert!(fixture.env.elapsed() <= Duration::from_secs(1));
        prop_assert_eq!(result.success(), expected <= 1 || (expected == 2 && delay_ms <= 1_000));
    }
}
