use std::io::Write;

use serial_test::serial;

use super::*;

fn cli(args: &[&str]) -> CliArgs {
    CliArgs::parse_from(args)
}

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.ttl_seconds, 240);
    assert_eq!(settings.cache.max_entries, 1000);
    assert_eq!(settings.cache.index_miss_warn_threshold, 10);
    assert_eq!(settings.cache.consume_batch_limit, 100);
    assert_eq!(settings.scheduler.cadence, Duration::from_secs(60));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(600);
    raw.logging.level = Some("info".to_string());

    let overrides = SettingsOverrides {
        cache_ttl_seconds: Some(0),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.ttl_seconds, 0);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn negative_ttl_is_accepted_as_disabled() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(-1);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl_seconds, -1);
}

#[test]
fn zero_capacity_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_entries = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_entries",
            ..
        }
    ));
}

#[test]
fn unknown_log_level_is_rejected() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("loud".to_string());

    let err = Settings::from_raw(raw).expect_err("bad level");
    assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
}

#[test]
fn parse_publish_branch_arguments() {
    let args = cli(&[
        "arbor",
        "publish-branch",
        "--seed",
        "/tmp/seed.toml",
        "--id",
        "10",
        "--force",
    ]);

    match args.command {
        Command::PublishBranch(branch) => {
            assert_eq!(branch.node.id, 10);
            assert_eq!(
                branch.node.seed.seed,
                std::path::Path::new("/tmp/seed.toml")
            );
            assert!(branch.force);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_global_overrides_after_subcommand() {
    let args = cli(&[
        "arbor",
        "resolve",
        "--seed",
        "seed.toml",
        "--id",
        "42",
        "--cache-ttl-seconds",
        "-5",
        "--log-json",
        "true",
    ]);

    assert!(matches!(args.command, Command::Resolve(ref node) if node.id == 42));
    assert_eq!(args.overrides.cache_ttl_seconds, Some(-5));
    assert_eq!(args.overrides.log_json, Some(true));
}

#[test]
#[serial]
fn config_file_and_environment_are_layered() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    writeln!(
        file,
        "[cache]\nttl_seconds = 30\nmax_entries = 50\n\n[logging]\nlevel = \"warn\""
    )
    .expect("write config");

    let path = file.path().to_str().expect("utf-8 path").to_string();
    // SAFETY: serialised with the other environment-touching tests.
    unsafe { std::env::set_var("ARBOR__CACHE__MAX_ENTRIES", "75") };
    let args = cli(&[
        "arbor",
        "--config-file",
        path.as_str(),
        "path-check",
        "--seed",
        "seed.toml",
        "--id",
        "42",
    ]);
    let loaded = load(&args);
    unsafe { std::env::remove_var("ARBOR__CACHE__MAX_ENTRIES") };

    let settings = loaded.expect("settings load");
    assert_eq!(settings.cache.ttl_seconds, 30);
    assert_eq!(settings.cache.max_entries, 75);
    assert_eq!(settings.logging.level, LevelFilter::WARN);
}

#[test]
#[serial]
fn missing_explicit_config_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    let args = cli(&[
        "arbor",
        "--config-file",
        missing.to_str().expect("utf-8 path"),
        "sweep",
        "--seed",
        "seed.toml",
    ]);

    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}
