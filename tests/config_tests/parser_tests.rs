//! Config Tests
//!
//! Tests verify:
//! - Config-string parsing (separators, trimming, escapes)
//! - Typed accessors (bool, size, float)
//! - Nested config files
//! - Supervisor config defaults and overrides

use std::io::Write;

use bucketkv::config::{Config, ConfigMap, CONFIG_FILE_KEY, MAX_CONFIG_FILE_DEPTH};
use bucketkv::{BucketEngine, BucketError, Identity};
use tempfile::NamedTempFile;

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_parse_empty_string() {
    let map = ConfigMap::parse("").unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_parse_pairs_with_whitespace() {
    let map = ConfigMap::parse(" engine = memory ; admin=root;; ").unwrap();

    assert_eq!(map.string("engine"), Some("memory"));
    assert_eq!(map.string("admin"), Some("root"));
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["admin", "engine"]);
}

#[test]
fn test_parse_escaped_separators() {
    let map = ConfigMap::parse(r"path=a\;b\=c;x=1").unwrap();

    assert_eq!(map.string("path"), Some("a;b=c"));
    assert_eq!(map.string("x"), Some("1"));
}

#[test]
fn test_parse_missing_equals_is_error() {
    let result = ConfigMap::parse("engine");
    assert!(matches!(result, Err(BucketError::Config(_))));
}

#[test]
fn test_parse_empty_key_is_error() {
    assert!(ConfigMap::parse("=value").is_err());
}

#[test]
fn test_parse_double_equals_is_error() {
    assert!(ConfigMap::parse("a=b=c").is_err());
}

#[test]
fn test_last_duplicate_wins() {
    let map = ConfigMap::parse("a=1;a=2").unwrap();
    assert_eq!(map.string("a"), Some("2"));
}

// =============================================================================
// Typed Accessor Tests
// =============================================================================

#[test]
fn test_bool_values() {
    let map = ConfigMap::parse("a=true;b=OFF;c=yes;d=0;e=maybe").unwrap();

    assert_eq!(map.bool("a").unwrap(), Some(true));
    assert_eq!(map.bool("b").unwrap(), Some(false));
    assert_eq!(map.bool("c").unwrap(), Some(true));
    assert_eq!(map.bool("d").unwrap(), Some(false));
    assert!(map.bool("e").is_err());
    assert_eq!(map.bool("missing").unwrap(), None);
}

#[test]
fn test_size_suffixes() {
    let map = ConfigMap::parse("a=512;b=4k;c=2M;d=1g;e=lots").unwrap();

    assert_eq!(map.size("a").unwrap(), Some(512));
    assert_eq!(map.size("b").unwrap(), Some(4096));
    assert_eq!(map.size("c").unwrap(), Some(2 * 1024 * 1024));
    assert_eq!(map.size("d").unwrap(), Some(1024 * 1024 * 1024));
    assert!(map.size("e").is_err());
}

#[test]
fn test_size_overflow() {
    let map = ConfigMap::parse("a=99999999999999999g").unwrap();
    assert!(map.size("a").is_err());
}

#[test]
fn test_float_value() {
    let map = ConfigMap::parse("factor=1.25;bad=x").unwrap();

    assert_eq!(map.float("factor").unwrap(), Some(1.25));
    assert!(map.float("bad").is_err());
}

// =============================================================================
// Config File Tests
// =============================================================================

#[test]
fn test_config_file_is_spliced_in() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# bucket defaults").unwrap();
    writeln!(file, "cache_size=1m").unwrap();
    writeln!(file, "engine=from_file").unwrap();

    let text = format!("{}={};engine=inline", CONFIG_FILE_KEY, file.path().display());
    let map = ConfigMap::parse_with_files(&text).unwrap();

    assert_eq!(map.size("cache_size").unwrap(), Some(1024 * 1024));
    assert_eq!(map.string("engine"), Some("inline"));
    assert!(!map.contains(CONFIG_FILE_KEY));
}

#[test]
fn test_missing_config_file_is_error() {
    let result = ConfigMap::parse_with_files("config_file=/nonexistent/bucketkv.conf");
    assert!(matches!(result, Err(BucketError::Config(_))));
}

fn include_line(path: &std::path::Path) -> String {
    format!("{}={}", CONFIG_FILE_KEY, path.display())
}

#[test]
fn test_self_including_config_file_is_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "cache_size=1k").unwrap();
    writeln!(file, "{}", include_line(file.path())).unwrap();

    let result = ConfigMap::parse_with_files(&include_line(file.path()));
    assert!(matches!(result, Err(BucketError::Config(_))));
    assert!(matches!(ConfigMap::from_file(file.path()), Err(BucketError::Config(_))));
}

#[test]
fn test_mutually_including_config_files_are_error() {
    let mut first = NamedTempFile::new().unwrap();
    let mut second = NamedTempFile::new().unwrap();
    writeln!(first, "{}", include_line(second.path())).unwrap();
    writeln!(second, "{}", include_line(first.path())).unwrap();

    let result = ConfigMap::parse_with_files(&include_line(first.path()));
    assert!(matches!(result, Err(BucketError::Config(_))));
}

#[test]
fn test_nested_config_files_within_depth() {
    let mut inner = NamedTempFile::new().unwrap();
    writeln!(inner, "cache_size=2k").unwrap();
    writeln!(inner, "engine=inner").unwrap();
    let mut outer = NamedTempFile::new().unwrap();
    writeln!(outer, "engine=outer").unwrap();
    writeln!(outer, "{}", include_line(inner.path())).unwrap();

    let map = ConfigMap::parse_with_files(&include_line(outer.path())).unwrap();
    assert_eq!(map.size("cache_size").unwrap(), Some(2048));
    assert_eq!(map.string("engine"), Some("outer"));
}

#[test]
fn test_config_files_nested_too_deep_are_error() {
    // A straight chain one level longer than allowed, no cycles
    let mut files: Vec<NamedTempFile> = Vec::new();
    let mut last = NamedTempFile::new().unwrap();
    writeln!(last, "cache_size=1k").unwrap();
    files.push(last);
    for _ in 0..MAX_CONFIG_FILE_DEPTH {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", include_line(files.last().unwrap().path())).unwrap();
        files.push(file);
    }

    let top = include_line(files.last().unwrap().path());
    assert!(matches!(ConfigMap::parse_with_files(&top), Err(BucketError::Config(_))));

    // Dropping the innermost level fits
    let fits = include_line(files[files.len() - 2].path());
    let map = ConfigMap::parse_with_files(&fits).unwrap();
    assert_eq!(map.size("cache_size").unwrap(), Some(1024));
}

#[test]
fn test_auth_with_self_including_config_leaves_session_unbound() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", include_line(file.path())).unwrap();

    let engine = BucketEngine::open(Config::default()).unwrap();
    let session = engine.new_session("test:looping");
    engine.on_connect(&session);
    engine.on_auth(
        &session,
        Identity::new("looping").with_config(include_line(file.path())),
    );

    assert_eq!(session.bound_bucket(), None);
    assert!(!engine.registry().contains("looping"));
}

// =============================================================================
// Supervisor Config Tests
// =============================================================================

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.engine_path, "memory");
    assert_eq!(config.admin_user, None);
    assert!(!config.default_bucket);
    assert!(config.auto_create);
    assert_eq!(config.max_connections, 1024);
}

#[test]
fn test_config_from_string() {
    let config =
        Config::from_config_str("engine=probe;admin=root;default=true;auto_create=off").unwrap();

    assert_eq!(config.engine_path, "probe");
    assert_eq!(config.admin_user.as_deref(), Some("root"));
    assert!(config.default_bucket);
    assert!(!config.auto_create);
}

#[test]
fn test_config_string_rejects_bad_bool() {
    assert!(Config::from_config_str("default=sometimes").is_err());
}

#[test]
fn test_config_builder() {
    let config = Config::builder()
        .engine_path("probe")
        .admin_user("root")
        .default_bucket_name("shared")
        .auto_create(false)
        .listen_addr("0.0.0.0:9000")
        .max_connections(10)
        .build();

    assert_eq!(config.engine_path, "probe");
    assert_eq!(config.default_bucket_name.as_deref(), Some("shared"));
    assert!(!config.auto_create);
    assert_eq!(config.listen_addr, "0.0.0.0:9000");
    assert_eq!(config.max_connections, 10);
}
