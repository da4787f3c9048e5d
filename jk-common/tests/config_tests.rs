//! Tests for root folder resolution priority
//!
//! Uses serial_test because the resolver reads process environment variables.

use jk_common::config::{default_root_folder, RootFolderResolver, TomlConfig};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

const TEST_ENV: &str = "JK_ROOT_FOLDER_TEST";

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(TEST_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = RootFolderResolver::new(Some(PathBuf::from("/from/cli")))
        .with_env_var(TEST_ENV)
        .resolve(&toml);

    assert_eq!(resolved, PathBuf::from("/from/cli"));
    env::remove_var(TEST_ENV);
}

#[test]
#[serial]
fn test_environment_beats_toml() {
    env::set_var(TEST_ENV, "/from/env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };

    let resolved = RootFolderResolver::new(None).with_env_var(TEST_ENV).resolve(&toml);

    assert_eq!(resolved, PathBuf::from("/from/env"));
    env::remove_var(TEST_ENV);
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(TEST_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/from/toml")),
        ..Default::default()
    };
    let resolver = RootFolderResolver::new(None).with_env_var(TEST_ENV);

    assert_eq!(resolver.resolve(&toml), PathBuf::from("/from/toml"));
    assert_eq!(resolver.resolve(&TomlConfig::default()), default_root_folder());
}
