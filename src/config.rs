use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "nyumba", about = "Rental marketplace backend")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, env = "NYUMBA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "NYUMBA_HOST")]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "NYUMBA_PORT")]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long, env = "NYUMBA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
    pub rewards: RewardsConfig,
    pub accounts: AccountsConfig,
    pub payments: PaymentsConfig,
    pub tasks: TasksConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub allowed_types: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Accounts registered with one of these emails are made admins.
    pub emails: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RewardsConfig {
    pub referral_bonus: i64,
    pub signup_bonus: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AccountsConfig {
    pub deletion_grace_days: i64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PaymentsConfig {
    pub currency: String,
    pub webhook_secret: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TasksConfig {
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_upload_bytes: 5 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
            ],
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_hours: 720,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            referral_bonus: 50,
            signup_bonus: 20,
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            deletion_grace_days: 30,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            currency: "USDC".to_string(),
            webhook_secret: None,
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3600,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        config.resolve_paths(&data_dir);
        Ok(config)
    }

    /// Fill unset database/upload paths relative to the data directory.
    pub fn resolve_paths(&mut self, data_dir: &std::path::Path) {
        if self.database.path.is_none() {
            self.database.path = Some(data_dir.join("nyumba.db"));
        }
        if self.storage.path.is_none() {
            self.storage.path = Some(data_dir.join("uploads"));
        }
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nyumba")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("nyumba.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin
            .emails
            .iter()
            .any(|e| e.eq_ignore_ascii_case(email.trim()))
    }
}
