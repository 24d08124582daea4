//! Shared fixtures for simulated menu tests.

#![allow(dead_code)]

use menuharness_core::{ConnectionParameters, MatcherConfig, MenuMatcher};
use menuharness_sim::{SimBus, SimEnv, SimItem, SimTransport};
use tracing_subscriber::EnvFilter;

pub const BUS_NAME: &str = "com.example.Indicator";
pub const MENU_PATH: &str = "/com/example/Indicator/menu";
pub const ACTIONS_PATH: &str = "/com/example/Indicator";

/// Route harness logs to the test writer. Filter with `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn parameters() -> ConnectionParameters {
    ConnectionParameters::new(BUS_NAME, [("indicator", ACTIONS_PATH)], MENU_PATH)
}

/// Flat menu with one labelled item per entry.
pub fn labels(labels: &[&str]) -> Vec<SimItem> {
    labels.iter().map(|label| SimItem::labelled(label)).collect()
}

/// Simulated bus plus the clock driving it.
pub struct Fixture {
    pub env: SimEnv,
    pub bus: SimBus,
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        let env = SimEnv::new();
        let bus = SimBus::new(env.clone());
        Self { env, bus }
    }

    pub fn publish(&self, items: Vec<SimItem>) {
        self.bus.publish_menu(BUS_NAME, MENU_PATH, items);
    }

    pub fn matcher(&self) -> MenuMatcher<SimTransport, SimEnv> {
        self.matcher_with(MatcherConfig::default())
    }

    pub fn matcher_with(&self, config: MatcherConfig) -> MenuMatcher<SimTransport, SimEnv> {
        MenuMatcher::with_config(parameters(), SimTransport::new(&self.bus), self.env.clone(), config)
            .expect("simulated bus accepts connections")
    }
}
