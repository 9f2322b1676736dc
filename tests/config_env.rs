use std::time::Duration;

use clap::Parser;
use serial_test::serial;

use homefeed::application::feed::FanoutPolicy;
use homefeed::config::{self, CliArgs};

fn clear_env() {
    for key in [
        "HOMEFEED__FEED__CACHE_CAPACITY",
        "HOMEFEED__FEED__FANOUT_POLICY",
        "HOMEFEED__FEED__IO_TIMEOUT_MS",
        "HOMEFEED__SERVER__PORT",
    ] {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
#[serial]
fn environment_overrides_defaults() {
    clear_env();
    // SAFETY: tests touching the environment are serialized.
    unsafe {
        std::env::set_var("HOMEFEED__FEED__CACHE_CAPACITY", "250");
        std::env::set_var("HOMEFEED__FEED__FANOUT_POLICY", "best_effort");
        std::env::set_var("HOMEFEED__FEED__IO_TIMEOUT_MS", "750");
    }

    let settings = config::load(&CliArgs::parse_from(["homefeed"])).expect("settings load");
    clear_env();

    assert_eq!(settings.feed.cache_capacity.get(), 250);
    assert_eq!(settings.feed.fanout_policy, FanoutPolicy::BestEffort);
    assert_eq!(settings.feed.io_timeout, Duration::from_millis(750));
}

#[test]
#[serial]
fn cli_flags_beat_environment() {
    clear_env();
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var("HOMEFEED__SERVER__PORT", "9000") };

    let args = CliArgs::parse_from(["homefeed", "serve", "--server-port", "9100"]);
    let settings = config::load(&args).expect("settings load");
    clear_env();

    assert_eq!(settings.server.addr.port(), 9100);
}

#[test]
#[serial]
fn invalid_environment_value_is_reported() {
    clear_env();
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var("HOMEFEED__FEED__FANOUT_POLICY", "whenever") };

    let result = config::load(&CliArgs::parse_from(["homefeed"]));
    clear_env();

    assert!(matches!(
        result,
        Err(config::LoadError::Invalid {
            key: "feed.fanout_policy",
            ..
        })
    ));
}
