use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub chat: ChatConfig,
    pub server: ServerConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

/// Remote key-field record store (one base, several tables).
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub base_id: String,
    pub users_table: String,
    pub products_table: String,
    pub orders_table: String,
    pub custom_orders_table: String,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub admin_chat_id: String,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub store_api_key: Option<String>,
    pub store_base_id: Option<String>,
    pub chat_bot_token: Option<String>,
    pub admin_chat_id: Option<String>,
    pub log_level: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                base_url: "https://api.airtable.com/v0".to_string(),
                api_key: String::new().into(),
                base_id: String::new(),
                users_table: "Users".to_string(),
                products_table: "Products".to_string(),
                orders_table: "Orders".to_string(),
                custom_orders_table: "Custom_Orders".to_string(),
            },
            chat: ChatConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                admin_chat_id: String::new(),
                poll_timeout_secs: 25,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
            reconcile: ReconcileConfig { interval_secs: 60 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
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
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("intake.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(base_url) = store.base_url {
                self.store.base_url = base_url;
            }
            if let Some(api_key_value) = store.api_key {
                self.store.api_key = secret_value(api_key_value);
            }
            if let Some(base_id) = store.base_id {
                self.store.base_id = base_id;
            }
            if let Some(users_table) = store.users_table {
                self.store.users_table = users_table;
            }
            if let Some(products_table) = store.products_table {
                self.store.products_table = products_table;
            }
            if let Some(orders_table) = store.orders_table {
                self.store.orders_table = orders_table;
            }
            if let Some(custom_orders_table) = store.custom_orders_table {
                self.store.custom_orders_table = custom_orders_table;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(bot_token_value) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = chat.api_base_url {
                self.chat.api_base_url = api_base_url;
            }
            if let Some(admin_chat_id) = chat.admin_chat_id {
                self.chat.admin_chat_id = admin_chat_id;
            }
            if let Some(poll_timeout_secs) = chat.poll_timeout_secs {
                self.chat.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(reconcile) = patch.reconcile {
            if let Some(interval_secs) = reconcile.interval_secs {
                self.reconcile.interval_secs = interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INTAKE_STORE_BASE_URL") {
            self.store.base_url = value;
        }
        if let Some(value) = read_env("INTAKE_STORE_API_KEY") {
            self.store.api_key = secret_value(value);
        }
        if let Some(value) = read_env("INTAKE_STORE_BASE_ID") {
            self.store.base_id = value;
        }
        if let Some(value) = read_env("INTAKE_STORE_USERS_TABLE") {
            self.store.users_table = value;
        }
        if let Some(value) = read_env("INTAKE_STORE_PRODUCTS_TABLE") {
            self.store.products_table = value;
        }
        if let Some(value) = read_env("INTAKE_STORE_ORDERS_TABLE") {
            self.store.orders_table = value;
        }
        if let Some(value) = read_env("INTAKE_STORE_CUSTOM_ORDERS_TABLE") {
            self.store.custom_orders_table = value;
        }

        if let Some(value) = read_env("INTAKE_CHAT_BOT_TOKEN") {
            self.chat.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("INTAKE_CHAT_API_BASE_URL") {
            self.chat.api_base_url = value;
        }
        if let Some(value) = read_env("INTAKE_CHAT_ADMIN_CHAT_ID") {
            self.chat.admin_chat_id = value;
        }
        if let Some(value) = read_env("INTAKE_CHAT_POLL_TIMEOUT_SECS") {
            self.chat.poll_timeout_secs = parse_u64("INTAKE_CHAT_POLL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTAKE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INTAKE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("INTAKE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        if let Some(value) = read_env("INTAKE_RECONCILE_INTERVAL_SECS") {
            self.reconcile.interval_secs = parse_u64("INTAKE_RECONCILE_INTERVAL_SECS", &value)?;
        }

        let log_level = read_env("INTAKE_LOGGING_LEVEL").or_else(|| read_env("INTAKE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTAKE_LOGGING_FORMAT").or_else(|| read_env("INTAKE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_api_key) = overrides.store_api_key {
            self.store.api_key = secret_value(store_api_key);
        }
        if let Some(store_base_id) = overrides.store_base_id {
            self.store.base_id = store_base_id;
        }
        if let Some(chat_bot_token) = overrides.chat_bot_token {
            self.chat.bot_token = secret_value(chat_bot_token);
        }
        if let Some(admin_chat_id) = overrides.admin_chat_id {
            self.chat.admin_chat_id = admin_chat_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_chat(&self.chat)?;
        validate_server(&self.server)?;
        validate_reconcile(&self.reconcile)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("intake.toml"), PathBuf::from("config/intake.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if !store.base_url.starts_with("http://") && !store.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "store.base_url must start with http:// or https://".to_string(),
        ));
    }

    if store.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "store.api_key is required. Provide it in intake.toml or via INTAKE_STORE_API_KEY"
                .to_string(),
        ));
    }

    if store.base_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "store.base_id is required. Provide it in intake.toml or via INTAKE_STORE_BASE_ID"
                .to_string(),
        ));
    }

    for (name, table) in [
        ("store.users_table", &store.users_table),
        ("store.products_table", &store.products_table),
        ("store.orders_table", &store.orders_table),
        ("store.custom_orders_table", &store.custom_orders_table),
    ] {
        if table.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{name} must not be empty")));
        }
    }

    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required. Provide it in intake.toml or via INTAKE_CHAT_BOT_TOKEN"
                .to_string(),
        ));
    }

    if !chat.api_base_url.starts_with("http://") && !chat.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "chat.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if chat.admin_chat_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.admin_chat_id is required so new orders can be routed to a person".to_string(),
        ));
    }

    if chat.poll_timeout_secs == 0 || chat.poll_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "chat.poll_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_reconcile(reconcile: &ReconcileConfig) -> Result<(), ConfigError> {
    if reconcile.interval_secs == 0 || reconcile.interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "reconcile.interval_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    chat: Option<ChatPatch>,
    server: Option<ServerPatch>,
    reconcile: Option<ReconcilePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    base_url: Option<String>,
    api_key: Option<String>,
    base_id: Option<String>,
    users_table: Option<String>,
    products_table: Option<String>,
    orders_table: Option<String>,
    custom_orders_table: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    admin_chat_id: Option<String>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcilePatch {
    interval_secs: Option<u64>,
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

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_env() {
        env::set_var("INTAKE_STORE_API_KEY", "key-test");
        env::set_var("INTAKE_STORE_BASE_ID", "appTestBase");
        env::set_var("INTAKE_CHAT_BOT_TOKEN", "123456:token-test");
        env::set_var("INTAKE_CHAT_ADMIN_CHAT_ID", "99100");
    }

    const REQUIRED_VARS: [&str; 4] = [
        "INTAKE_STORE_API_KEY",
        "INTAKE_STORE_BASE_ID",
        "INTAKE_CHAT_BOT_TOKEN",
        "INTAKE_CHAT_ADMIN_CHAT_ID",
    ];

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_STORE_API_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intake.toml");
            fs::write(
                &path,
                r#"
[store]
api_key = "${TEST_STORE_API_KEY}"
base_id = "appFromFile"

[chat]
bot_token = "123456:file-token"
admin_chat_id = "42"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.store.api_key.expose_secret() == "key-from-env",
                "store api key should be loaded from environment",
            )?;
            ensure(config.store.base_id == "appFromFile", "base id should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_STORE_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("INTAKE_LOG_LEVEL", "warn");
        env::set_var("INTAKE_LOG_FORMAT", "pretty");

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

        let mut vars = REQUIRED_VARS.to_vec();
        vars.extend(["INTAKE_LOG_LEVEL", "INTAKE_LOG_FORMAT"]);
        clear_vars(&vars);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_STORE_API_KEY", "key-from-env");
        env::set_var("INTAKE_CHAT_BOT_TOKEN", "123456:env-token");
        env::set_var("INTAKE_CHAT_ADMIN_CHAT_ID", "777");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("intake.toml");
            fs::write(
                &path,
                r#"
[store]
api_key = "key-from-file"
base_id = "appFromFile"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_base_id: Some("appFromOverride".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.store.base_id == "appFromOverride",
                "override base id should win over the file value",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.store.api_key.expose_secret() == "key-from-env",
                "env api key should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["INTAKE_STORE_API_KEY", "INTAKE_CHAT_BOT_TOKEN", "INTAKE_CHAT_ADMIN_CHAT_ID"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::remove_var("INTAKE_STORE_BASE_ID");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("store.base_id")
            );
            ensure(has_message, "validation failure should mention store.base_id")
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }

    #[test]
    fn out_of_range_reconcile_interval_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("INTAKE_RECONCILE_INTERVAL_SECS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("reconcile.interval_secs")
            );
            ensure(has_message, "validation failure should mention reconcile.interval_secs")
        })();

        let mut vars = REQUIRED_VARS.to_vec();
        vars.push("INTAKE_RECONCILE_INTERVAL_SECS");
        clear_vars(&vars);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("INTAKE_STORE_API_KEY", "key-secret-value");
        env::set_var("INTAKE_STORE_BASE_ID", "appTestBase");
        env::set_var("INTAKE_CHAT_BOT_TOKEN", "123456:token-secret-value");
        env::set_var("INTAKE_CHAT_ADMIN_CHAT_ID", "99100");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("key-secret-value"),
                "debug output should not contain the store api key",
            )?;
            ensure(
                !debug.contains("token-secret-value"),
                "debug output should not contain the bot token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&REQUIRED_VARS);
        result
    }
}
