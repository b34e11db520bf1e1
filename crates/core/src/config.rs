use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub reasoning_model: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Take the guest client address from `X-Forwarded-For`. Only safe behind a proxy
    /// that overwrites the header.
    pub trust_forwarded_for: bool,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub system_prompt: String,
    pub max_steps: u32,
    pub allow_anonymous: bool,
    pub generate_titles: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierQuota {
    pub standard: u32,
    pub reasoning: u32,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub guest: TierQuota,
    pub free: TierQuota,
    pub pro: TierQuota,
    pub enterprise: TierQuota,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
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
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub chat_allow_anonymous: Option<bool>,
    pub rate_limit_enabled: Option<bool>,
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

const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant. Keep your responses concise and helpful. \
When a visitor shares contact details and shows buying intent, use the capture_lead tool.";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://gingga.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                reasoning_model: None,
                max_tokens: 2048,
                timeout_secs: 60,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                trust_forwarded_for: false,
            },
            chat: ChatConfig {
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                max_steps: 5,
                allow_anonymous: true,
                generate_titles: true,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                window_secs: 86_400,
                guest: TierQuota { standard: 20, reasoning: 0 },
                free: TierQuota { standard: 100, reasoning: 10 },
                pro: TierQuota { standard: 1_000, reasoning: 200 },
                enterprise: TierQuota { standard: 10_000, reasoning: 2_000 },
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
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

impl LlmConfig {
    /// Resolves the client-selected model id (`chat-model`, `chat-model-reasoning`)
    /// to a provider model name.
    pub fn resolve_model(&self, selected: Option<&str>) -> String {
        match selected {
            Some(id) if id.to_ascii_lowercase().contains("reasoning") => {
                self.reasoning_model.clone().unwrap_or_else(|| self.model.clone())
            }
            _ => self.model.clone(),
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("gingga.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(reasoning_model) = llm.reasoning_model {
                self.llm.reasoning_model = Some(reasoning_model);
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(trust_forwarded_for) = server.trust_forwarded_for {
                self.server.trust_forwarded_for = trust_forwarded_for;
            }
        }

        if let Some(chat) = patch.chat {
            if let Some(system_prompt) = chat.system_prompt {
                self.chat.system_prompt = system_prompt;
            }
            if let Some(max_steps) = chat.max_steps {
                self.chat.max_steps = max_steps;
            }
            if let Some(allow_anonymous) = chat.allow_anonymous {
                self.chat.allow_anonymous = allow_anonymous;
            }
            if let Some(generate_titles) = chat.generate_titles {
                self.chat.generate_titles = generate_titles;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(enabled) = rate_limit.enabled {
                self.rate_limit.enabled = enabled;
            }
            if let Some(window_secs) = rate_limit.window_secs {
                self.rate_limit.window_secs = window_secs;
            }
            if let Some(tiers) = rate_limit.tiers {
                apply_quota_patch(&mut self.rate_limit.guest, tiers.guest);
                apply_quota_patch(&mut self.rate_limit.free, tiers.free);
                apply_quota_patch(&mut self.rate_limit.pro, tiers.pro);
                apply_quota_patch(&mut self.rate_limit.enterprise, tiers.enterprise);
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
        if let Some(value) = read_env("GINGGA_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("GINGGA_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("GINGGA_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("GINGGA_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GINGGA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("GINGGA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("GINGGA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("GINGGA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("GINGGA_LLM_REASONING_MODEL") {
            self.llm.reasoning_model = Some(value);
        }
        if let Some(value) = read_env("GINGGA_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("GINGGA_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("GINGGA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("GINGGA_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("GINGGA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("GINGGA_SERVER_PORT") {
            self.server.port = parse_u16("GINGGA_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("GINGGA_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("GINGGA_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_SERVER_TRUST_FORWARDED_FOR") {
            self.server.trust_forwarded_for =
                parse_bool("GINGGA_SERVER_TRUST_FORWARDED_FOR", &value)?;
        }

        if let Some(value) = read_env("GINGGA_CHAT_SYSTEM_PROMPT") {
            self.chat.system_prompt = value;
        }
        if let Some(value) = read_env("GINGGA_CHAT_MAX_STEPS") {
            self.chat.max_steps = parse_u32("GINGGA_CHAT_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_CHAT_ALLOW_ANONYMOUS") {
            self.chat.allow_anonymous = parse_bool("GINGGA_CHAT_ALLOW_ANONYMOUS", &value)?;
        }
        if let Some(value) = read_env("GINGGA_CHAT_GENERATE_TITLES") {
            self.chat.generate_titles = parse_bool("GINGGA_CHAT_GENERATE_TITLES", &value)?;
        }

        if let Some(value) = read_env("GINGGA_RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = parse_bool("GINGGA_RATE_LIMIT_ENABLED", &value)?;
        }
        if let Some(value) = read_env("GINGGA_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = parse_u64("GINGGA_RATE_LIMIT_WINDOW_SECS", &value)?;
        }

        let log_level = read_env("GINGGA_LOGGING_LEVEL").or_else(|| read_env("GINGGA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GINGGA_LOGGING_FORMAT").or_else(|| read_env("GINGGA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(allow_anonymous) = overrides.chat_allow_anonymous {
            self.chat.allow_anonymous = allow_anonymous;
        }
        if let Some(enabled) = overrides.rate_limit_enabled {
            self.rate_limit.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_chat(&self.chat)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_quota_patch(quota: &mut TierQuota, patch: Option<TierQuotaPatch>) {
    if let Some(patch) = patch {
        if let Some(standard) = patch.standard {
            quota.standard = standard;
        }
        if let Some(reasoning) = patch.reasoning {
            quota.reasoning = reasoning;
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("gingga.toml"), PathBuf::from("config/gingga.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation("llm.max_tokens must be greater than zero".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.max_steps == 0 || chat.max_steps > 10 {
        return Err(ConfigError::Validation("chat.max_steps must be in range 1..=10".to_string()));
    }
    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if rate_limit.enabled && rate_limit.window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate_limit.window_secs must be greater than zero".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    chat: Option<ChatPatch>,
    rate_limit: Option<RateLimitPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    reasoning_model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    trust_forwarded_for: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    system_prompt: Option<String>,
    max_steps: Option<u32>,
    allow_anonymous: Option<bool>,
    generate_titles: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    enabled: Option<bool>,
    window_secs: Option<u64>,
    tiers: Option<TiersPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TiersPatch {
    guest: Option<TierQuotaPatch>,
    free: Option<TierQuotaPatch>,
    pro: Option<TierQuotaPatch>,
    enterprise: Option<TierQuotaPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TierQuotaPatch {
    standard: Option<u32>,
    reasoning: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
