#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use chatwire_client::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
reconnect:
  base_delay_ms: 500
  max_dealy_ms: 9000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.heartbeat.interval(), Duration::from_secs(30));
    assert_eq!(cfg.heartbeat.timeout(), Duration::from_secs(10));
    assert_eq!(cfg.reconnect.base_delay(), Duration::from_secs(1));
    assert_eq!(cfg.reconnect.max_delay(), Duration::from_secs(30));
    assert_eq!(cfg.storage.offline_queue_key, "chatwire.offline_queue");
}

#[test]
fn unsupported_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn heartbeat_timeout_must_fit_inside_interval() {
    let bad = r#"
version: 1
heartbeat:
  interval_ms: 5000
  timeout_ms: 5000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn max_delay_below_base_rejected() {
    let bad = r#"
version: 1
reconnect:
  base_delay_ms: 2000
  max_delay_ms: 1000
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn storage_keys_must_differ() {
    let bad = r#"
version: 1
storage:
  offline_queue_key: "same"
  active_room_key: "same"
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[test]
fn endpoint_url_maps_scheme_and_carries_token() {
    let cfg = config::load_from_str(
        r#"
version: 1
endpoint:
  origin: "https://chat.example.com"
"#,
    )
    .unwrap();

    let url = cfg.endpoint.url_for("abc 123").unwrap();
    assert_eq!(url.scheme(), "wss");
    assert_eq!(url.path(), "/messenger/ws");
    let token: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(token, vec![("token".to_string(), "abc 123".to_string())]);

    let plain = config::ClientConfig::default();
    let url = plain.endpoint.url_for("t").unwrap();
    assert_eq!(url.as_str(), "ws://127.0.0.1:8080/messenger/ws?token=t");
}

#[test]
fn endpoint_rejects_foreign_scheme() {
    let bad = r#"
version: 1
endpoint:
  origin: "ftp://chat.example.com"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}
