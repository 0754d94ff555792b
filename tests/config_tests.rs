//! Integration tests for configuration files and the config service.

use std::fs;

use memwatch::config::{
    load_config, parse_config, render_config, ConfigError, ConfigOverrides, ConfigService, FileFormat,
    MonitorConfig,
};
use memwatch::roles::Role;

#[test]
fn test_all_formats_load_the_same_config() {
    let tmp = tempfile::tempdir().unwrap();
    let mut expected = MonitorConfig::default();
    expected.sampling.interval_ms = 2500;
    expected.history.capacity = 120;

    for (name, format) in [
        ("memwatch.yaml", FileFormat::Yaml),
        ("memwatch.json", FileFormat::Json),
        ("memwatch.toml", FileFormat::Toml),
    ] {
        let path = tmp.path().join(name);
        fs::write(&path, render_config(&expected, format).unwrap()).unwrap();
        assert_eq!(load_config(&path).unwrap(), expected, "{}", name);
    }
}

#[test]
fn test_custom_rules_from_yaml() {
    let yaml = r#"
rules:
  - role: supervisor
    priority: 1
    matches: ["tray-host"]
  - role: service
    priority: 2
    regex: "daemon(\\.py)?$"
"#;
    let cfg = parse_config(yaml, FileFormat::Yaml, "inline.yaml".as_ref()).unwrap();
    let classifier = cfg.validate().unwrap();
    assert_eq!(classifier.classify_cmdline("python daemon.py"), Some(Role::Service));
    assert_eq!(classifier.classify_cmdline("/opt/tray-host"), Some(Role::Supervisor));
    // Unspecified sections keep their defaults.
    assert_eq!(cfg.history.capacity, 3600);
}

#[test]
fn test_invalid_file_prevents_start() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("memwatch.yaml");
    fs::write(&path, "history:\n  capacity: 0\n").unwrap();
    let err = ConfigService::load(Some(path.clone()), ConfigOverrides::default()).err().unwrap();
    assert!(matches!(err, ConfigError::ZeroCapacity));

    fs::write(&path, "sampling: [not, a, map]\n").unwrap();
    let err = ConfigService::load(Some(path), ConfigOverrides::default()).err().unwrap();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_persist_writes_file_and_swaps() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("memwatch.json");
    fs::write(&path, "{}").unwrap();
    let service = ConfigService::load(Some(path.clone()), ConfigOverrides::default()).unwrap();

    let mut next = service.current().config.clone();
    next.publish.queue_capacity = 8;
    service.persist(next).unwrap();

    assert_eq!(service.current().config.publish.queue_capacity, 8);
    assert_eq!(load_config(&path).unwrap().publish.queue_capacity, 8);

    // Invalid changes are refused and leave everything untouched.
    let mut bad = service.current().config.clone();
    bad.rules.clear();
    assert!(service.persist(bad).is_err());
    assert_eq!(service.current().config.rules.len(), 2);
    assert_eq!(load_config(&path).unwrap().rules.len(), 2);
}
