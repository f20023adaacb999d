use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".vices";
const CONFIG_FILE: &str = "config.json";
const SESSION_FILE: &str = "session.json";
pub const BILLING_API_KEY_ENV: &str = "VICES_BILLING_API_KEY";
const MIN_BILLING_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub report_dir: PathBuf,
    pub api_port: u16,
    pub quote_count: usize,
    pub billing_api_key: Option<String>,
    pub billing_api_base_url: String,
    pub billing_timeout_seconds: u64,
    pub require_subscription: bool,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("vices.db"),
            session_path: root.join(SESSION_FILE),
            report_dir: default_report_dir(),
            api_port: 7966,
            quote_count: 3,
            billing_api_key: None,
            billing_api_base_url: "https://api.revenuecat.com/v1".to_string(),
            billing_timeout_seconds: 20,
            require_subscription: false,
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        fs::create_dir_all(&self.report_dir).with_context(|| {
            format!(
                "Failed to create report directory: {}",
                self.report_dir.display()
            )
        })?;

        Ok(())
    }

    /// The billing key from the environment wins over the stored one.
    pub fn resolved_billing_api_key(&self) -> Option<String> {
        env::var(BILLING_API_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.billing_api_key.clone())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "db_path" => {
                self.db_path = expand_home(value);
            }
            "session_path" => {
                self.session_path = expand_home(value);
            }
            "report_dir" => {
                self.report_dir = expand_home(value);
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "quote_count" => {
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| anyhow!("quote_count must be a number"))?;
                if parsed == 0 {
                    bail!("quote_count must be at least 1");
                }
                self.quote_count = parsed;
            }
            "billing_api_key" => {
                self.billing_api_key = (!value.trim().is_empty()).then(|| value.trim().to_string());
            }
            "billing_api_base_url" => {
                self.billing_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "billing_timeout_seconds" => {
                self.billing_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("billing_timeout_seconds must be a number"))?
                    .max(MIN_BILLING_TIMEOUT_SECONDS);
            }
            "require_subscription" => {
                self.require_subscription = value
                    .parse::<bool>()
                    .map_err(|_| anyhow!("require_subscription must be true/false"))?;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, session_path|session.path, report_dir|report.dir, api_port|api.port, quote_count|quotes.count, billing_api_key|billing.api_key, billing_api_base_url|billing.base_url, billing_timeout_seconds|billing.timeout_seconds, require_subscription|billing.required"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "session_path" => Some(self.session_path.display().to_string()),
            "report_dir" => Some(self.report_dir.display().to_string()),
            "api_port" => Some(self.api_port.to_string()),
            "quote_count" => Some(self.quote_count.to_string()),
            "billing_api_key" => Some(
                self.billing_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "billing_api_base_url" => Some(self.billing_api_base_url.clone()),
            "billing_timeout_seconds" => Some(self.billing_timeout_seconds.to_string()),
            "require_subscription" => Some(self.require_subscription.to_string()),
            _ => None,
        }
    }
}

pub fn is_secret_key(key: &str) -> bool {
    normalize_config_key(key) == "billing_api_key"
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "session_path" | "session.path" => "session_path",
        "report_dir" | "report.dir" => "report_dir",
        "api_port" | "api.port" => "api_port",
        "quote_count" | "quotes.count" => "quote_count",
        "billing_api_key" | "billing.api_key" => "billing_api_key",
        "billing_api_base_url" | "billing.base_url" => "billing_api_base_url",
        "billing_timeout_seconds" | "billing.timeout_seconds" => "billing_timeout_seconds",
        "require_subscription" | "billing.required" => "require_subscription",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

pub fn default_report_dir() -> PathBuf {
    default_root_dir().join("reports")
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
