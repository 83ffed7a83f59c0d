use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value as JsonValue};
use shopchat_core::config::LoadOptions;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Fields whose origin is reported, with the environment variables that can set them.
const TRACKED_FIELDS: &[(&str, &[&str])] = &[
    ("store.url", &["SHOPCHAT_STORE_URL"]),
    ("store.max_connections", &["SHOPCHAT_STORE_MAX_CONNECTIONS"]),
    ("store.timeout_secs", &["SHOPCHAT_STORE_TIMEOUT_SECS"]),
    ("store.state_ttl_secs", &["SHOPCHAT_STORE_STATE_TTL_SECS"]),
    ("store.operation_timeout_ms", &[]),
    ("classifier.enabled", &["SHOPCHAT_CLASSIFIER_ENABLED"]),
    ("classifier.base_url", &["SHOPCHAT_CLASSIFIER_BASE_URL"]),
    ("classifier.api_key", &["SHOPCHAT_CLASSIFIER_API_KEY"]),
    ("classifier.timeout_secs", &["SHOPCHAT_CLASSIFIER_TIMEOUT_SECS"]),
    ("classifier.max_retries", &["SHOPCHAT_CLASSIFIER_MAX_RETRIES"]),
    ("classifier.confidence_threshold", &["SHOPCHAT_CLASSIFIER_CONFIDENCE_THRESHOLD"]),
    ("checkout.installment.periods", &["SHOPCHAT_CHECKOUT_INSTALLMENT_PERIODS"]),
    ("checkout.shipping.courier_fee", &["SHOPCHAT_CHECKOUT_COURIER_FEE"]),
    ("logging.level", &["SHOPCHAT_LOGGING_LEVEL", "SHOPCHAT_LOG_LEVEL"]),
    ("logging.format", &["SHOPCHAT_LOGGING_FORMAT", "SHOPCHAT_LOG_FORMAT"]),
];

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut sources = Map::new();
    for (key_path, env_keys) in TRACKED_FIELDS {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        sources.insert((*key_path).to_string(), JsonValue::String(source));
    }

    CommandResult::success_with(
        "config",
        "effective config (source precedence: flag > env > file > default)",
        json!({
            "config": config.redacted(),
            "sources": sources,
        }),
    )
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("shopchat.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/shopchat.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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
