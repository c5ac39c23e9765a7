#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meterline_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
billing:
  starting_balance: 10
  enforce_flor: true # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.billing.starting_balance, 10);
    assert!(cfg.billing.enforce_floor);
    assert!(cfg.billing.journal_path.is_none());
    assert_eq!(cfg.billing.costs.get("report"), Some(&3));
    assert_eq!(cfg.billing.costs.get("question"), Some(&1));
    assert_eq!(cfg.channels.queue_capacity, 64);
}

#[test]
fn custom_costs_replace_defaults() {
    let ok = r#"
version: 1
billing:
  costs:
    question: 2
    translation: 5
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.billing.costs.len(), 2);
    assert_eq!(cfg.billing.costs.get("translation"), Some(&5));
    assert!(cfg.billing.costs.get("report").is_none());
}

#[test]
fn unsupported_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn negative_cost_rejected() {
    let bad = r#"
version: 1
billing:
  costs:
    question: -1
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn idle_timeout_must_exceed_ping_interval() {
    let bad = r#"
version: 1
gateway:
  ping_interval_ms: 30000
  idle_timeout_ms: 20000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("idle_timeout_ms"));
}

#[test]
fn zero_queue_capacity_rejected() {
    let bad = r#"
version: 1
channels:
  queue_capacity: 0
"#;
    assert!(config::load_from_str(bad).is_err());
}
