//! Property-based tests for configuration parsing and validation.
//!
//! These tests use proptest to check that the four-line format accepts
//! exactly the port pairs that are in range and distinct.

use llama_app_server::core::{BackendConfig, ConfigError};
use once_cell::sync::Lazy;
use proptest::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Directory holding an executable `llama-server` and a readable model file.
static FIXTURE: Lazy<(TempDir, PathBuf, PathBuf)> = Lazy::new(|| {
    let dir = tempfile::tempdir().unwrap();
    let bin_dir = dir.path().join("bin");
    std::fs::create_dir(&bin_dir).unwrap();

    let server = bin_dir.join("llama-server");
    std::fs::write(&server, "#!/bin/sh\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let model = dir.path().join("model.gguf");
    std::fs::write(&model, b"GGUF").unwrap();
    (dir, bin_dir, model)
});

fn config_source(backend_port: i64, dispatcher_port: i64) -> String {
    let (_, bin_dir, model) = &*FIXTURE;
    format!(
        "{}\n{}\n{}\n{}\n",
        bin_dir.display(),
        model.display(),
        backend_port,
        dispatcher_port
    )
}

fn port_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        3 => 1024i64..=65535,
        1 => -100i64..1024,
        1 => 65536i64..200_000,
    ]
}

proptest! {
    /// Validation succeeds iff both ports are in range and distinct.
    #[test]
    fn prop_ports_valid_iff_in_range_and_distinct(
        backend in port_strategy(),
        dispatcher in port_strategy(),
    ) {
        let config = BackendConfig::parse(&config_source(backend, dispatcher)).unwrap();
        prop_assert_eq!(config.backend_port(), backend);
        prop_assert_eq!(config.dispatcher_port(), dispatcher);

        let in_range = |p: i64| (1024..=65535).contains(&p);
        let expected = in_range(backend) && in_range(dispatcher) && backend != dispatcher;
        let result = config.validate();
        prop_assert_eq!(result.is_ok(), expected, "result: {:?}", result);
    }

    /// Same port for both servers is always a conflict.
    #[test]
    fn prop_equal_ports_conflict(port in 1024i64..=65535) {
        let config = BackendConfig::parse(&config_source(port, port)).unwrap();
        let is_conflict = matches!(
            config.validate(),
            Err(ConfigError::PortConflict { port: p }) if p == port
        );
        prop_assert!(is_conflict);
    }

    /// A source cut short reports the first missing line.
    #[test]
    fn prop_truncated_source_names_missing_line(keep in 0usize..4) {
        let source = config_source(8080, 8081);
        let truncated: String = source
            .lines()
            .take(keep)
            .map(|line| format!("{line}\n"))
            .collect();

        let err = BackendConfig::parse(&truncated).unwrap_err();
        prop_assert_eq!(err.line(), Some(keep + 1));
        let is_missing_line = matches!(err, ConfigError::MissingLine { .. });
        prop_assert!(is_missing_line);
    }

    /// Non-numeric port lines are rejected at parse time.
    #[test]
    fn prop_non_numeric_port_rejected(value in "[a-zA-Z][a-zA-Z0-9.]{0,8}") {
        let (_, bin_dir, model) = &*FIXTURE;
        let source = format!("{}\n{}\n{}\n8081\n", bin_dir.display(), model.display(), value);

        let err = BackendConfig::parse(&source).unwrap_err();
        prop_assert_eq!(err.line(), Some(3));
    }

    /// Surrounding whitespace on any line does not change the parse.
    #[test]
    fn prop_whitespace_is_trimmed(pad in "[ \t]{0,4}") {
        let padded: String = config_source(8080, 8081)
            .lines()
            .map(|line| format!("{pad}{line}{pad}\r\n"))
            .collect();

        let plain = BackendConfig::parse(&config_source(8080, 8081)).unwrap();
        let trimmed = BackendConfig::parse(&padded).unwrap();
        prop_assert_eq!(plain, trimmed);
    }
}
