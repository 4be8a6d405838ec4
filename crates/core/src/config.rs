use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub messenger: MessengerConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Outbound delivery to the messaging platform's send API.
#[derive(Clone, Debug)]
pub struct MessengerConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Tried in order; the next key is used only when the previous one fails.
    pub api_keys: Vec<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub quiet_window_ms: u64,
    pub dedup_ttl_secs: u64,
    pub followup_after_mins: u64,
    pub followup_sweep_secs: u64,
    pub followup_message: String,
}

impl ConversationConfig {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    pub fn followup_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.followup_sweep_secs)
    }

    /// Sessions idle since before this instant are due a follow-up.
    pub fn followup_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let minutes = self.followup_after_mins.min(MAX_FOLLOWUP_AFTER_MINS) as i64;
        now - chrono::Duration::minutes(minutes)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_keys: Option<Vec<String>>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

const MAX_FOLLOWUP_AFTER_MINS: u64 = 43_200;

pub const DEFAULT_FOLLOWUP_MESSAGE: &str =
    "আপনার অর্ডারটি এখনো সম্পন্ন হয়নি। অর্ডার কনফার্ম করতে চাইলে আমাদের জানাবেন।";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://dokan.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            messenger: MessengerConfig {
                api_base_url: "https://graph.facebook.com/v19.0".to_string(),
                timeout_secs: 10,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_keys: Vec::new(),
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            conversation: ConversationConfig {
                quiet_window_ms: 3_000,
                dedup_ttl_secs: 300,
                followup_after_mins: 60,
                followup_sweep_secs: 300,
                followup_message: DEFAULT_FOLLOWUP_MESSAGE.to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn secret_list(values: impl IntoIterator<Item = String>) -> Vec<SecretString> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(secret_value)
        .collect()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(read_patch(&path)?),
            None if options.require_file => {
                let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dokan.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            assign(&mut self.database.url, database.url);
            assign(&mut self.database.max_connections, database.max_connections);
            assign(&mut self.database.timeout_secs, database.timeout_secs);
        }

        if let Some(messenger) = patch.messenger {
            assign(&mut self.messenger.api_base_url, messenger.api_base_url);
            assign(&mut self.messenger.timeout_secs, messenger.timeout_secs);
        }

        if let Some(llm) = patch.llm {
            assign(&mut self.llm.provider, llm.provider);
            assign(&mut self.llm.api_keys, llm.api_keys.map(secret_list));
            assign(&mut self.llm.base_url, llm.base_url.map(Some));
            assign(&mut self.llm.model, llm.model);
            assign(&mut self.llm.timeout_secs, llm.timeout_secs);
        }

        if let Some(server) = patch.server {
            assign(&mut self.server.bind_address, server.bind_address);
            assign(&mut self.server.port, server.port);
            assign(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }

        if let Some(conversation) = patch.conversation {
            let target = &mut self.conversation;
            assign(&mut target.quiet_window_ms, conversation.quiet_window_ms);
            assign(&mut target.dedup_ttl_secs, conversation.dedup_ttl_secs);
            assign(&mut target.followup_after_mins, conversation.followup_after_mins);
            assign(&mut target.followup_sweep_secs, conversation.followup_sweep_secs);
            assign(&mut target.followup_message, conversation.followup_message);
        }

        if let Some(logging) = patch.logging {
            assign(&mut self.logging.level, logging.level);
            assign(&mut self.logging.format, logging.format);
        }
    }

    /// Every key is `DOKAN_<SECTION>_<FIELD>`; `DOKAN_LOG_LEVEL` and `DOKAN_LOG_FORMAT` are
    /// accepted as short forms.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        assign(&mut database.url, read_env("DOKAN_DATABASE_URL"));
        assign(&mut database.max_connections, env_number("DOKAN_DATABASE_MAX_CONNECTIONS")?);
        assign(&mut database.timeout_secs, env_number("DOKAN_DATABASE_TIMEOUT_SECS")?);

        let messenger = &mut self.messenger;
        assign(&mut messenger.api_base_url, read_env("DOKAN_MESSENGER_API_BASE_URL"));
        assign(&mut messenger.timeout_secs, env_number("DOKAN_MESSENGER_TIMEOUT_SECS")?);

        let llm = &mut self.llm;
        let provider: Option<LlmProvider> =
            read_env("DOKAN_LLM_PROVIDER").map(|value| value.parse()).transpose()?;
        assign(&mut llm.provider, provider);
        let api_keys = read_env("DOKAN_LLM_API_KEYS")
            .map(|value| secret_list(value.split(',').map(str::to_string)));
        assign(&mut llm.api_keys, api_keys);
        assign(&mut llm.base_url, read_env("DOKAN_LLM_BASE_URL").map(Some));
        assign(&mut llm.model, read_env("DOKAN_LLM_MODEL"));
        assign(&mut llm.timeout_secs, env_number("DOKAN_LLM_TIMEOUT_SECS")?);

        let server = &mut self.server;
        assign(&mut server.bind_address, read_env("DOKAN_SERVER_BIND_ADDRESS"));
        assign(&mut server.port, env_number("DOKAN_SERVER_PORT")?);
        assign(
            &mut server.graceful_shutdown_secs,
            env_number("DOKAN_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        let conversation = &mut self.conversation;
        assign(
            &mut conversation.quiet_window_ms,
            env_number("DOKAN_CONVERSATION_QUIET_WINDOW_MS")?,
        );
        assign(
            &mut conversation.dedup_ttl_secs,
            env_number("DOKAN_CONVERSATION_DEDUP_TTL_SECS")?,
        );
        assign(
            &mut conversation.followup_after_mins,
            env_number("DOKAN_CONVERSATION_FOLLOWUP_AFTER_MINS")?,
        );
        assign(
            &mut conversation.followup_sweep_secs,
            env_number("DOKAN_CONVERSATION_FOLLOWUP_SWEEP_SECS")?,
        );
        assign(&mut conversation.followup_message, read_env("DOKAN_CONVERSATION_FOLLOWUP_MESSAGE"));

        let level = read_env("DOKAN_LOGGING_LEVEL").or_else(|| read_env("DOKAN_LOG_LEVEL"));
        assign(&mut self.logging.level, level);
        let format = read_env("DOKAN_LOGGING_FORMAT").or_else(|| read_env("DOKAN_LOG_FORMAT"));
        let format: Option<LogFormat> = format.map(|value| value.parse()).transpose()?;
        assign(&mut self.logging.format, format);

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.database.url, overrides.database_url);
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.llm.provider, overrides.llm_provider);
        assign(&mut self.llm.model, overrides.llm_model);
        assign(&mut self.llm.api_keys, overrides.llm_api_keys.map(secret_list));
        assign(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_messenger(&self.messenger)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_conversation(&self.conversation)?;
        validate_logging(&self.logging)
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dokan.toml"), PathBuf::from("config/dokan.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&interpolate_env_vars(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` with the variable's value; an unset variable is an error.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn require_range(key: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    require((min..=max).contains(&value), format!("{key} must be in range {min}..={max}"))
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    require(
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
        "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
    )?;
    require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
    require_range("database.timeout_secs", database.timeout_secs, 1, 300)
}

fn validate_messenger(messenger: &MessengerConfig) -> Result<(), ConfigError> {
    let base = messenger.api_base_url.trim();
    require(
        base.starts_with("http://") || base.starts_with("https://"),
        "messenger.api_base_url must start with http:// or https://",
    )?;
    require_range("messenger.timeout_secs", messenger.timeout_secs, 1, 60)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    require_range("llm.timeout_secs", llm.timeout_secs, 1, 300)?;
    require(!llm.model.trim().is_empty(), "llm.model must not be empty")?;

    match llm.provider {
        LlmProvider::OpenAi => require(
            llm.api_keys.iter().any(|key| !key.expose_secret().trim().is_empty()),
            "llm.api_keys needs at least one key for the openai provider",
        ),
        LlmProvider::Ollama => require(
            llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
            "llm.base_url is required for ollama provider",
        ),
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    require(server.port > 0, "server.port must be greater than zero")?;
    require(
        server.graceful_shutdown_secs > 0,
        "server.graceful_shutdown_secs must be greater than zero",
    )
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    require_range("conversation.quiet_window_ms", conversation.quiet_window_ms, 1, 60_000)?;
    require(
        conversation.dedup_ttl_secs > 0,
        "conversation.dedup_ttl_secs must be greater than zero",
    )?;
    require_range(
        "conversation.followup_after_mins",
        conversation.followup_after_mins,
        1,
        MAX_FOLLOWUP_AFTER_MINS,
    )?;
    require(
        conversation.followup_sweep_secs > 0,
        "conversation.followup_sweep_secs must be greater than zero",
    )?;
    require(
        !conversation.followup_message.trim().is_empty(),
        "conversation.followup_message must not be empty",
    )
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    require(
        matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
        "logging.level must be one of trace|debug|info|warn|error",
    )
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    messenger: Option<MessengerPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    conversation: Option<ConversationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MessengerPatch {
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_keys: Option<Vec<String>>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    quiet_window_ms: Option<u64>,
    dedup_ttl_secs: Option<u64>,
    followup_after_mins: Option<u64>,
    followup_sweep_secs: Option<u64>,
    followup_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        interpolate_env_vars, AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_match_conversation_timings() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            config.conversation.quiet_window() == Duration::from_secs(3),
            "quiet window defaults to three seconds",
        )?;
        ensure(
            config.conversation.dedup_ttl() == Duration::from_secs(300),
            "dedup ttl defaults to five minutes",
        )?;
        ensure(config.messenger.timeout_secs == 10, "messenger timeout defaults to ten seconds")?;

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().ok_or("valid timestamp")?;
        ensure(
            config.conversation.followup_cutoff(now)
                == Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).single().ok_or("valid timestamp")?,
            "follow-up cutoff is one hour back",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DOKAN_PRIMARY_KEY", "sk-primary");
        env::set_var("TEST_DOKAN_BACKUP_KEY", "sk-backup");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dokan.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_keys = ["${TEST_DOKAN_PRIMARY_KEY}", "${TEST_DOKAN_BACKUP_KEY}"]
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            let keys =
                config.llm.api_keys.iter().map(|key| key.expose_secret()).collect::<Vec<_>>();
            ensure(keys == vec!["sk-primary", "sk-backup"], "keys keep their fallback order")?;
            Ok(())
        })();

        clear_vars(&["TEST_DOKAN_PRIMARY_KEY", "TEST_DOKAN_BACKUP_KEY"]);
        result
    }

    #[test]
    fn comma_separated_key_list_from_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_LLM_PROVIDER", "openai");
        env::set_var("DOKAN_LLM_API_KEYS", "sk-one, ,sk-two");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.api_keys.len() == 2, "blank entries are dropped")?;
            ensure(
                config.llm.api_keys[1].expose_secret() == "sk-two",
                "entries are trimmed and ordered",
            )
        })();

        clear_vars(&["DOKAN_LLM_PROVIDER", "DOKAN_LLM_API_KEYS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_LOG_LEVEL", "warn");
        env::set_var("DOKAN_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DOKAN_LOG_LEVEL", "DOKAN_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DOKAN_CONVERSATION_QUIET_WINDOW_MS", "1500");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dokan.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[conversation]
quiet_window_ms = 5000
followup_after_mins = 90

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.conversation.quiet_window_ms == 1_500,
                "env quiet window should win over file",
            )?;
            ensure(
                config.conversation.followup_after_mins == 90,
                "file value should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["DOKAN_DATABASE_URL", "DOKAN_CONVERSATION_QUIET_WINDOW_MS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_keys")
            );
            ensure(has_message, "validation failure should mention llm.api_keys")
        })();

        clear_vars(&["DOKAN_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_value_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or("expected invalid override".to_string())?;
            let names_variable = matches!(
                error,
                ConfigError::InvalidEnvOverride { ref key, .. } if key == "DOKAN_SERVER_PORT"
            );
            ensure(names_variable, "error should name the offending variable")
        })();

        clear_vars(&["DOKAN_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DOKAN_LLM_API_KEYS", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["DOKAN_LLM_API_KEYS"]);
        result
    }

    #[test]
    fn interpolation_requires_closed_and_set_variables() {
        assert!(matches!(
            interpolate_env_vars("url = \"${DOKAN_UNCLOSED\""),
            Err(ConfigError::UnterminatedInterpolation)
        ));
        assert!(matches!(
            interpolate_env_vars("key = \"${DOKAN_TEST_NEVER_SET_VARIABLE}\""),
            Err(ConfigError::MissingEnvInterpolation { ref var })
                if var == "DOKAN_TEST_NEVER_SET_VARIABLE"
        ));
        assert!(matches!(interpolate_env_vars("plain = 1"), Ok(ref text) if text == "plain = 1"));
    }
}
