//! The shipped configuration file parses and matches the built-in defaults.

use std::path::Path;

use setu_graph::SetuConfig;

#[test]
fn test_shipped_config_matches_defaults() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/setu.yaml");
    let shipped = SetuConfig::load(&path).unwrap();
    let defaults = SetuConfig::default();

    let as_yaml = |c: &SetuConfig| serde_yaml::to_value(c).unwrap();
    assert_eq!(as_yaml(&shipped), as_yaml(&defaults));
}
