use lms_portal::{AppConfig, config::Env};
use serial_test::serial;
use std::{env, panic};

const VARS: &[&str] = &[
    "APP_ENV",
    "BIND_ADDR",
    "DATABASE_URL",
    "DB_MAX_CONNECTIONS",
    "S3_ENDPOINT",
    "S3_ACCESS_KEY",
    "S3_SECRET_KEY",
    "S3_BUCKET_NAME",
    "JWT_SECRET",
    "JWT_REFRESH_SECRET",
    "ACCESS_TOKEN_TTL_MINUTES",
    "REFRESH_TOKEN_TTL_DAYS",
];

// --- Setup/Teardown Utilities ---

/// Clears every config variable, applies `vars`, runs `test`, then restores the
/// previous environment even when `test` panics.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> std::thread::Result<R>
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> =
        VARS.iter().map(|&var| (var, env::var(var).ok())).collect();

    unsafe {
        for var in VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    unsafe {
        for (key, original) in originals {
            match original {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
    result
}

// --- Tests ---

#[test]
#[serial]
fn test_local_config_uses_defaults() {
    let config = run_with_env(&[("DATABASE_URL", "postgres://u:p@localhost/lms")], || {
        AppConfig::load()
    })
    .expect("local config should load with only DATABASE_URL");

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    assert_eq!(config.s3_endpoint, "http://localhost:9000");
    assert_eq!(config.s3_bucket, "lms-uploads");
    assert_eq!(config.jwt_secret, "lms-local-access-secret");
    assert_ne!(config.jwt_secret, config.jwt_refresh_secret);
    assert_eq!(config.access_token_ttl_minutes, 15);
    assert_eq!(config.refresh_token_ttl_days, 7);
}

#[test]
#[serial]
fn test_local_config_reads_overrides() {
    let config = run_with_env(
        &[
            ("DATABASE_URL", "memory"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("ACCESS_TOKEN_TTL_MINUTES", "30"),
            ("S3_BUCKET_NAME", "custom"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.db_url, "memory");
    assert_eq!(config.bind_addr, "127.0.0.1:8080");
    assert_eq!(config.db_max_connections, 12);
    assert_eq!(config.access_token_ttl_minutes, 30);
    assert_eq!(config.s3_bucket, "custom");
}

#[test]
#[serial]
fn test_local_config_requires_database_url() {
    let result = run_with_env(&[("APP_ENV", "local")], AppConfig::load);
    assert!(result.is_err(), "missing DATABASE_URL must abort startup");
}

#[test]
#[serial]
fn test_non_numeric_ttl_fails_fast() {
    let result = run_with_env(
        &[
            ("DATABASE_URL", "memory"),
            ("REFRESH_TOKEN_TTL_DAYS", "a week"),
        ],
        AppConfig::load,
    );
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_production_config_fail_fast_on_missing_secrets() {
    // S3 credentials and JWT secrets are missing.
    let result = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://u:p@db/lms"),
            ("S3_ENDPOINT", "https://s3.example.com"),
        ],
        AppConfig::load,
    );
    assert!(
        result.is_err(),
        "production config loading should panic on missing secrets"
    );
}

#[test]
#[serial]
fn test_production_config_loads_when_complete() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("DATABASE_URL", "postgres://u:p@db/lms"),
            ("S3_ENDPOINT", "https://s3.example.com"),
            ("S3_ACCESS_KEY", "key"),
            ("S3_SECRET_KEY", "secret"),
            ("JWT_SECRET", "access"),
            ("JWT_REFRESH_SECRET", "refresh"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.s3_region, "us-east-1");
    assert_eq!(config.jwt_refresh_secret, "refresh");
}

#[test]
fn test_default_config_is_local() {
    let config = AppConfig::default();
    assert_eq!(config.env, Env::Local);
    assert!(config.db_max_connections > 0);
}
