// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_match_two_sided_daemon() {
    let config = Config::default();
    assert_eq!(config.port, 21075);
    assert_eq!(config.max_connections, 2);
    assert_eq!(config.max_transfer_unit, 64 * 1024);
    assert_eq!(config.unwritten_read, UnwrittenRead::ZeroFill);
    assert_eq!(config.listen_addr().to_string(), "127.0.0.1:21075");
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let file = write_config(
        r#"
port = 0
unwritten_read = "error"
payload_timeout = "2s"

[bootstrap]
leading_blocks = 4
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.port, 0);
    assert_eq!(config.unwritten_read, UnwrittenRead::Error);
    assert_eq!(config.payload_timeout, Duration::from_secs(2));
    assert_eq!(config.bootstrap.leading_blocks, 4);
    assert_eq!(config.bootstrap.max_slot, 3);
    assert_eq!(config.max_drives, 4096);
}

#[test]
fn malformed_file_is_a_parse_error() {
    let file = write_config("port = \"not a port\"");
    assert!(matches!(
        Config::from_file(file.path()),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::from_file(&dir.path().join("absent.toml")),
        Err(ConfigError::Read(..))
    ));
}

#[test]
fn derived_policies_follow_config() {
    let config = Config {
        max_drives: 8,
        verify_compressed: false,
        unwritten_read: UnwrittenRead::Error,
        ..Config::default()
    };
    let options = config.registry_options();
    assert_eq!(options.capacity, 8);
    assert!(!options.verify_compressed);
    assert_eq!(config.fill_policy().unwritten, UnwrittenRead::Error);
}
