use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;

use alur_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let doc = config_file_doc.as_ref();
    let path = config_file_path.as_deref();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        field_source("database.url", Some("ALUR_DATABASE_URL"), doc, path),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        field_source("database.max_connections", Some("ALUR_DATABASE_MAX_CONNECTIONS"), doc, path),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        field_source("database.timeout_secs", Some("ALUR_DATABASE_TIMEOUT_SECS"), doc, path),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        field_source("server.bind_address", Some("ALUR_SERVER_BIND_ADDRESS"), doc, path),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        field_source("server.port", Some("ALUR_SERVER_PORT"), doc, path),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        field_source("server.health_check_port", Some("ALUR_SERVER_HEALTH_CHECK_PORT"), doc, path),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        field_source(
            "server.graceful_shutdown_secs",
            Some("ALUR_SERVER_GRACEFUL_SHUTDOWN_SECS"),
            doc,
            path,
        ),
    ));

    lines.push(render_line(
        "notifier.enabled",
        &config.notifier.enabled.to_string(),
        field_source("notifier.enabled", Some("ALUR_NOTIFIER_ENABLED"), doc, path),
    ));
    lines.push(render_line(
        "notifier.webhook_url",
        config.notifier.webhook_url.as_deref().unwrap_or("(unset)"),
        field_source("notifier.webhook_url", Some("ALUR_NOTIFIER_WEBHOOK_URL"), doc, path),
    ));
    let auth_token = config
        .notifier
        .auth_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line(
        "notifier.auth_token",
        &auth_token,
        field_source("notifier.auth_token", Some("ALUR_NOTIFIER_AUTH_TOKEN"), doc, path),
    ));
    lines.push(render_line(
        "notifier.timeout_secs",
        &config.notifier.timeout_secs.to_string(),
        field_source("notifier.timeout_secs", Some("ALUR_NOTIFIER_TIMEOUT_SECS"), doc, path),
    ));

    lines.push(render_line(
        "org.seats",
        &format!("{} configured", config.org.seats.len()),
        field_source("org.seats", None, doc, path),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        field_source("logging.level", Some("ALUR_LOGGING_LEVEL"), doc, path),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_ascii_lowercase(),
        field_source("logging.format", Some("ALUR_LOGGING_FORMAT"), doc, path),
    ));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("  {key} = {value}  [{source}]")
}

fn redact_token(token: &str) -> String {
    if token.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &token[..4])
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("alur.toml"), PathBuf::from("config/alur.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_var: Option<&str>,
    doc: Option<&Value>,
    path: Option<&Path>,
) -> String {
    if let Some(env_var) = env_var {
        if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env {env_var}");
        }
    }

    if let (Some(doc), Some(path)) = (doc, path) {
        let mut cursor = Some(doc);
        for part in key.split('.') {
            cursor = cursor.and_then(|value| value.get(part));
        }
        if cursor.is_some() {
            return format!("file {}", path.display());
        }
    }

    "default".to_string()
}
