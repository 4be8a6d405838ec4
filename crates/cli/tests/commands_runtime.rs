use std::env;
use std::sync::{Mutex, OnceLock};

use dokan_cli::commands::{doctor, migrate, seed};
use serde_json::Value;

const IN_MEMORY: &[(&str, &str)] =
    &[("DOKAN_DATABASE_URL", "sqlite::memory:"), ("DOKAN_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(IN_MEMORY, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("migration(s) applied"));
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("DOKAN_DATABASE_URL", "postgres://localhost/dokan")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_reports_the_demo_merchant() {
    with_env(IN_MEMORY, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("demo merchant `demo-page`"));
        assert!(message.contains("5 catalog product(s)"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("dokan.db").display());

    with_env(&[("DOKAN_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn doctor_json_lists_every_check() {
    with_env(IN_MEMORY, || {
        let output = doctor::run(true);
        let report = parse_payload(&output);

        let names = report["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| check["name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "config_validation",
                "llm_readiness",
                "conversation_timing",
                "database_connectivity",
                "schema_migrations"
            ]
        );
        assert_eq!(report["checks"][2]["status"], "pass");
        assert_eq!(report["checks"][3]["status"], "pass");
        // a fresh in-memory database has no schema yet
        assert_eq!(report["checks"][4]["status"], "fail");
        assert_eq!(report["overall_status"], "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("DOKAN_LLM_PROVIDER", "openai")], || {
        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][4]["status"], "skipped");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "DOKAN_DATABASE_URL",
        "DOKAN_DATABASE_MAX_CONNECTIONS",
        "DOKAN_DATABASE_TIMEOUT_SECS",
        "DOKAN_MESSENGER_API_BASE_URL",
        "DOKAN_MESSENGER_TIMEOUT_SECS",
        "DOKAN_LLM_PROVIDER",
        "DOKAN_LLM_API_KEYS",
        "DOKAN_LLM_BASE_URL",
        "DOKAN_LLM_MODEL",
        "DOKAN_LLM_TIMEOUT_SECS",
        "DOKAN_SERVER_BIND_ADDRESS",
        "DOKAN_SERVER_PORT",
        "DOKAN_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "DOKAN_CONVERSATION_QUIET_WINDOW_MS",
        "DOKAN_CONVERSATION_DEDUP_TTL_SECS",
        "DOKAN_LOGGING_LEVEL",
        "DOKAN_LOGGING_FORMAT",
        "DOKAN_LOG_LEVEL",
        "DOKAN_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
