use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::conversation::CHECKOUT_STATE_TTL_SECS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub classifier: ClassifierConfig,
    pub checkout: CheckoutConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// `sqlite://...`, `sqlite::memory:` or `memory` for the in-process adapters.
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub state_ttl_secs: u64,
    pub operation_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub confidence_threshold: f32,
    pub history_limit: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub defaults: CheckoutPolicy,
    pub tenants: BTreeMap<String, CheckoutPolicy>,
}

/// Per-tenant money rules consumed by the pricing calculator and the flow engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutPolicy {
    pub installment: InstallmentTerms,
    pub deposit: DepositPolicy,
    pub shipping: ShippingRates,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallmentTerms {
    pub periods: u32,
    pub service_fee_percent: Decimal,
    pub max_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositPolicy {
    pub percent: Decimal,
    pub hold_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingRates {
    pub courier_fee: Decimal,
    pub rideshare_fee: Decimal,
}

impl Default for InstallmentTerms {
    fn default() -> Self {
        Self { periods: 3, service_fee_percent: Decimal::new(3, 0), max_days: 60 }
    }
}

impl Default for DepositPolicy {
    fn default() -> Self {
        Self { percent: Decimal::new(10, 0), hold_days: 14 }
    }
}

impl Default for ShippingRates {
    fn default() -> Self {
        Self { courier_fee: Decimal::new(150, 0), rideshare_fee: Decimal::ZERO }
    }
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub classifier_enabled: Option<bool>,
    pub classifier_base_url: Option<String>,
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
                url: "sqlite://shopchat.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                state_ttl_secs: CHECKOUT_STATE_TTL_SECS,
                operation_timeout_ms: 2_000,
            },
            classifier: ClassifierConfig {
                enabled: false,
                base_url: None,
                api_key: None,
                timeout_secs: 8,
                max_retries: 2,
                retry_base_delay_ms: 200,
                confidence_threshold: 0.9,
                history_limit: 6,
            },
            checkout: CheckoutConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("shopchat.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
            if let Some(state_ttl_secs) = store.state_ttl_secs {
                self.store.state_ttl_secs = state_ttl_secs;
            }
            if let Some(operation_timeout_ms) = store.operation_timeout_ms {
                self.store.operation_timeout_ms = operation_timeout_ms;
            }
        }

        if let Some(classifier) = patch.classifier {
            if let Some(enabled) = classifier.enabled {
                self.classifier.enabled = enabled;
            }
            if let Some(base_url) = classifier.base_url {
                self.classifier.base_url = Some(base_url);
            }
            if let Some(api_key) = classifier.api_key {
                self.classifier.api_key = Some(api_key.into());
            }
            if let Some(timeout_secs) = classifier.timeout_secs {
                self.classifier.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = classifier.max_retries {
                self.classifier.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = classifier.retry_base_delay_ms {
                self.classifier.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(confidence_threshold) = classifier.confidence_threshold {
                self.classifier.confidence_threshold = confidence_threshold;
            }
            if let Some(history_limit) = classifier.history_limit {
                self.classifier.history_limit = history_limit;
            }
        }

        if let Some(checkout) = patch.checkout {
            if let Some(installment) = checkout.installment {
                self.checkout.defaults.installment = installment;
            }
            if let Some(deposit) = checkout.deposit {
                self.checkout.defaults.deposit = deposit;
            }
            if let Some(shipping) = checkout.shipping {
                self.checkout.defaults.shipping = shipping;
            }
            if let Some(tenants) = checkout.tenants {
                self.checkout.tenants.extend(tenants);
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
        if let Some(value) = read_env("SHOPCHAT_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env("SHOPCHAT_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_env("SHOPCHAT_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_env("SHOPCHAT_STORE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_STORE_STATE_TTL_SECS") {
            self.store.state_ttl_secs = parse_env("SHOPCHAT_STORE_STATE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_ENABLED") {
            self.classifier.enabled = parse_env("SHOPCHAT_CLASSIFIER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_BASE_URL") {
            self.classifier.base_url = Some(value);
        }
        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_API_KEY") {
            self.classifier.api_key = Some(value.into());
        }
        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_TIMEOUT_SECS") {
            self.classifier.timeout_secs = parse_env("SHOPCHAT_CLASSIFIER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_MAX_RETRIES") {
            self.classifier.max_retries = parse_env("SHOPCHAT_CLASSIFIER_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_CLASSIFIER_CONFIDENCE_THRESHOLD") {
            self.classifier.confidence_threshold =
                parse_env("SHOPCHAT_CLASSIFIER_CONFIDENCE_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("SHOPCHAT_CHECKOUT_INSTALLMENT_PERIODS") {
            self.checkout.defaults.installment.periods =
                parse_env("SHOPCHAT_CHECKOUT_INSTALLMENT_PERIODS", &value)?;
        }
        if let Some(value) = read_env("SHOPCHAT_CHECKOUT_COURIER_FEE") {
            self.checkout.defaults.shipping.courier_fee =
                parse_env("SHOPCHAT_CHECKOUT_COURIER_FEE", &value)?;
        }

        let log_level =
            read_env("SHOPCHAT_LOGGING_LEVEL").or_else(|| read_env("SHOPCHAT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOPCHAT_LOGGING_FORMAT").or_else(|| read_env("SHOPCHAT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(enabled) = overrides.classifier_enabled {
            self.classifier.enabled = enabled;
        }
        if let Some(base_url) = overrides.classifier_base_url {
            self.classifier.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_classifier(&self.classifier)?;
        validate_policy("checkout", &self.checkout.defaults)?;
        for (tenant, policy) in &self.checkout.tenants {
            validate_policy(&format!("checkout.tenants.{tenant}"), policy)?;
        }
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration as JSON with secrets masked.
    pub fn redacted(&self) -> Value {
        let api_key = self.classifier.api_key.as_ref().map(|_| "********");
        json!({
            "store": {
                "url": self.store.url,
                "max_connections": self.store.max_connections,
                "timeout_secs": self.store.timeout_secs,
                "state_ttl_secs": self.store.state_ttl_secs,
                "operation_timeout_ms": self.store.operation_timeout_ms,
            },
            "classifier": {
                "enabled": self.classifier.enabled,
                "base_url": self.classifier.base_url,
                "api_key": api_key,
                "timeout_secs": self.classifier.timeout_secs,
                "max_retries": self.classifier.max_retries,
                "retry_base_delay_ms": self.classifier.retry_base_delay_ms,
                "confidence_threshold": self.classifier.confidence_threshold,
                "history_limit": self.classifier.history_limit,
            },
            "checkout": {
                "defaults": self.checkout.defaults,
                "tenants": self.checkout.tenants,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format.as_str(),
            },
        })
    }
}

/// Source of per-tenant checkout policy. `None` means the fixed defaults apply.
pub trait ConfigProvider: Send + Sync {
    fn checkout_policy(&self, tenant_id: &str) -> Option<CheckoutPolicy>;
}

/// Serves policies straight from the loaded `[checkout]` section.
#[derive(Clone, Debug, Default)]
pub struct StaticConfigProvider {
    checkout: CheckoutConfig,
}

impl StaticConfigProvider {
    pub fn new(checkout: CheckoutConfig) -> Self {
        Self { checkout }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn checkout_policy(&self, tenant_id: &str) -> Option<CheckoutPolicy> {
        self.checkout
            .tenants
            .get(tenant_id)
            .cloned()
            .or_else(|| Some(self.checkout.defaults.clone()))
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("shopchat.toml"), PathBuf::from("config/shopchat.toml")]
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
    let url = store.url.trim();
    let supported = url == "memory" || url.starts_with("sqlite://") || url.starts_with("sqlite::");
    if !supported {
        return Err(ConfigError::Validation(
            "store.url must be `memory` or a sqlite URL (`sqlite://...`, `sqlite::...`)"
                .to_string(),
        ));
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation("store.timeout_secs must be in range 1..=300".to_string()));
    }

    if store.state_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "store.state_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if store.operation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "store.operation_timeout_ms must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_classifier(classifier: &ClassifierConfig) -> Result<(), ConfigError> {
    if classifier.timeout_secs == 0 || classifier.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "classifier.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    let threshold = classifier.confidence_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConfigError::Validation(
            "classifier.confidence_threshold must be in range (0, 1]".to_string(),
        ));
    }

    if classifier.enabled {
        let base_url = classifier.base_url.as_deref().map(str::trim).unwrap_or_default();
        if base_url.is_empty() {
            return Err(ConfigError::Validation(
                "classifier.base_url is required when classifier.enabled is true".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "classifier.base_url must start with http:// or https://".to_string(),
            ));
        }
        let blank_key = classifier
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_key {
            return Err(ConfigError::Validation(
                "classifier.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_policy(section: &str, policy: &CheckoutPolicy) -> Result<(), ConfigError> {
    let installment = &policy.installment;
    if !(1..=24).contains(&installment.periods) {
        return Err(ConfigError::Validation(format!(
            "{section}.installment.periods must be in range 1..=24"
        )));
    }
    let hundred = Decimal::ONE_HUNDRED;
    if installment.service_fee_percent < Decimal::ZERO || installment.service_fee_percent > hundred
    {
        return Err(ConfigError::Validation(format!(
            "{section}.installment.service_fee_percent must be in range 0..=100"
        )));
    }
    let last_due_day = 30 * (installment.periods - 1);
    if last_due_day > installment.max_days {
        return Err(ConfigError::Validation(format!(
            "{section}.installment schedule spans {last_due_day} days but max_days is {}",
            installment.max_days
        )));
    }

    let deposit = &policy.deposit;
    if deposit.percent < Decimal::ZERO || deposit.percent > hundred {
        return Err(ConfigError::Validation(format!(
            "{section}.deposit.percent must be in range 0..=100"
        )));
    }

    let shipping = &policy.shipping;
    if shipping.courier_fee < Decimal::ZERO || shipping.rideshare_fee < Decimal::ZERO {
        return Err(ConfigError::Validation(format!(
            "{section}.shipping fees must not be negative"
        )));
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    classifier: Option<ClassifierPatch>,
    checkout: Option<CheckoutPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    state_ttl_secs: Option<u64>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    confidence_threshold: Option<f32>,
    history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutPatch {
    installment: Option<InstallmentTerms>,
    deposit: Option<DepositPolicy>,
    shipping: Option<ShippingRates>,
    tenants: Option<BTreeMap<String, CheckoutPolicy>>,
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

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, CheckoutConfig, CheckoutPolicy, ConfigError, ConfigOverrides, ConfigProvider,
        LoadOptions, LogFormat, StaticConfigProvider,
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

    fn write_config(dir: &TempDir, body: &str) -> Result<std::path::PathBuf, String> {
        let path = dir.path().join("shopchat.toml");
        fs::write(&path, body).map_err(|err| err.to_string())?;
        Ok(path)
    }

    #[test]
    fn defaults_match_fixed_checkout_terms() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        let policy = &config.checkout.defaults;

        ensure(policy.installment.periods == 3, "default periods should be 3")?;
        ensure(
            policy.installment.service_fee_percent == Decimal::new(3, 0),
            "default fee should be 3 percent",
        )?;
        ensure(policy.deposit.percent == Decimal::new(10, 0), "default deposit should be 10 percent")?;
        ensure(policy.deposit.hold_days == 14, "default hold should be 14 days")?;
        ensure(policy.shipping.courier_fee == Decimal::new(150, 0), "default courier fee is 150")?;
        ensure(policy.shipping.rideshare_fee == Decimal::ZERO, "default rideshare fee is 0")?;
        ensure(config.store.state_ttl_secs == 1_800, "state ttl should be 1800 seconds")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SHOPCHAT_CLASSIFIER_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[classifier]
enabled = true
base_url = "https://classifier.internal"
api_key = "${TEST_SHOPCHAT_CLASSIFIER_KEY}"
"#,
            )?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.classifier.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(key.as_deref() == Some("sk-from-env"), "api key should come from environment")
        })();

        clear_vars(&["TEST_SHOPCHAT_CLASSIFIER_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPCHAT_STORE_URL", "sqlite://from-env.db");
        env::set_var("SHOPCHAT_CHECKOUT_COURIER_FEE", "120");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = write_config(
                &dir,
                r#"
[store]
url = "sqlite://from-file.db"
max_connections = 3

[checkout.shipping]
courier_fee = 200

[logging]
level = "warn"
"#,
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_url: Some("memory".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.store.url == "memory", "override store url should win")?;
            ensure(config.store.max_connections == 3, "file value should survive")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.checkout.defaults.shipping.courier_fee == Decimal::new(120, 0),
                "env courier fee should win over file",
            )
        })();

        clear_vars(&["SHOPCHAT_STORE_URL", "SHOPCHAT_CHECKOUT_COURIER_FEE"]);
        result
    }

    #[test]
    fn tenant_tables_fall_back_to_defaults() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = write_config(
            &dir,
            r#"
[checkout.installment]
periods = 2

[checkout.tenants.gold-shop.installment]
periods = 1
service_fee_percent = 0
"#,
        )?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;
        let provider = StaticConfigProvider::new(config.checkout.clone());

        let tenant = provider.checkout_policy("gold-shop").ok_or("tenant policy missing")?;
        ensure(tenant.installment.periods == 1, "tenant periods should be 1")?;
        ensure(tenant.installment.service_fee_percent == Decimal::ZERO, "tenant fee should be 0")?;
        ensure(tenant.deposit.hold_days == 14, "unspecified tenant fields use fixed defaults")?;

        let other = provider.checkout_policy("unknown-shop").ok_or("default policy missing")?;
        ensure(other.installment.periods == 2, "unknown tenants get the [checkout] defaults")
    }

    #[test]
    fn validation_rejects_schedule_longer_than_max_days() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.checkout.defaults.installment.periods = 4;

        let has_message = matches!(
            config.validate(),
            Err(ConfigError::Validation(ref message)) if message.contains("max_days")
        );
        ensure(has_message, "validation failure should mention max_days")
    }

    #[test]
    fn validation_requires_base_url_when_classifier_enabled() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.classifier.enabled = true;

        let has_message = matches!(
            config.validate(),
            Err(ConfigError::Validation(ref message)) if message.contains("classifier.base_url")
        );
        ensure(has_message, "validation failure should mention classifier.base_url")?;

        config.classifier.base_url = Some("ftp://classifier".to_string());
        ensure(config.validate().is_err(), "non-http base url should be rejected")?;

        config.classifier.base_url = Some("http://127.0.0.1:9000".to_string());
        ensure(config.validate().is_ok(), "http base url should be accepted")
    }

    #[test]
    fn invalid_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPCHAT_STORE_MAX_CONNECTIONS", "lots");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "SHOPCHAT_STORE_MAX_CONNECTIONS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override to fail".to_string()),
        };

        clear_vars(&["SHOPCHAT_STORE_MAX_CONNECTIONS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.classifier.api_key = Some("sk-secret-value".to_string().into());

        let debug = format!("{config:?}");
        ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;

        let redacted = config.redacted().to_string();
        ensure(!redacted.contains("sk-secret-value"), "redacted json should not contain api key")?;
        ensure(redacted.contains("********"), "redacted json should mask the api key")
    }

    #[test]
    fn static_provider_serves_defaults_without_tenants() {
        let provider = StaticConfigProvider::new(CheckoutConfig::default());
        assert_eq!(provider.checkout_policy("any"), Some(CheckoutPolicy::default()));
    }
}
