use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use gingga_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    match render(LoadOptions::default()) {
        Ok(rendered) => CommandResult::success("config", rendered),
        Err(message) => CommandResult::failure("config", "config_validation", message, 2),
    }
}

/// Renders one `key = value (source: ..)` line per setting. Secrets never leave redacted.
pub fn render(options: LoadOptions) -> Result<String, String> {
    let explicit_path = options.config_path.clone();
    let config =
        AppConfig::load(options).map_err(|error| format!("config validation failed: {error}"))?;

    let config_file_path = explicit_path.or_else(detect_config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: String, env_key: &str| {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    };

    push("database.url", config.database.url.clone(), "GINGGA_DATABASE_URL");
    push(
        "database.max_connections",
        config.database.max_connections.to_string(),
        "GINGGA_DATABASE_MAX_CONNECTIONS",
    );
    push(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        "GINGGA_DATABASE_TIMEOUT_SECS",
    );

    push("llm.provider", format!("{:?}", config.llm.provider), "GINGGA_LLM_PROVIDER");
    push("llm.model", config.llm.model.clone(), "GINGGA_LLM_MODEL");
    push(
        "llm.reasoning_model",
        config.llm.reasoning_model.clone().unwrap_or_else(|| "<unset>".to_string()),
        "GINGGA_LLM_REASONING_MODEL",
    );
    push(
        "llm.base_url",
        config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        "GINGGA_LLM_BASE_URL",
    );
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("llm.api_key", api_key.to_string(), "GINGGA_LLM_API_KEY");
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), "GINGGA_LLM_TIMEOUT_SECS");
    push("llm.max_retries", config.llm.max_retries.to_string(), "GINGGA_LLM_MAX_RETRIES");

    push("server.bind_address", config.server.bind_address.clone(), "GINGGA_SERVER_BIND_ADDRESS");
    push("server.port", config.server.port.to_string(), "GINGGA_SERVER_PORT");
    push(
        "server.trust_forwarded_for",
        config.server.trust_forwarded_for.to_string(),
        "GINGGA_SERVER_TRUST_FORWARDED_FOR",
    );

    push("chat.max_steps", config.chat.max_steps.to_string(), "GINGGA_CHAT_MAX_STEPS");
    push(
        "chat.allow_anonymous",
        config.chat.allow_anonymous.to_string(),
        "GINGGA_CHAT_ALLOW_ANONYMOUS",
    );
    push(
        "chat.generate_titles",
        config.chat.generate_titles.to_string(),
        "GINGGA_CHAT_GENERATE_TITLES",
    );

    push("rate_limit.enabled", config.rate_limit.enabled.to_string(), "GINGGA_RATE_LIMIT_ENABLED");
    push(
        "rate_limit.window_secs",
        config.rate_limit.window_secs.to_string(),
        "GINGGA_RATE_LIMIT_WINDOW_SECS",
    );

    push("logging.level", config.logging.level.clone(), "GINGGA_LOGGING_LEVEL");
    push("logging.format", format!("{:?}", config.logging.format), "GINGGA_LOGGING_FORMAT");

    Ok(lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("gingga.toml"), PathBuf::from("config/gingga.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
