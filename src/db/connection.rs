use std::path::Path;

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;

use crate::LorekeepError;

/// Database handle for the feedback log. Embedded or remote.
pub type LorekeepDb = Surreal<Any>;

fn default_namespace() -> String {
    "lorekeep".to_string()
}

fn default_database() -> String {
    "feedback".to_string()
}

/// Feedback database location.
/// Loaded from `{data_path}/database.toml`, env vars, or defaults to embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DbConfig {
    /// Embedded RocksDB under the data path. Single-process access.
    Embedded {
        #[serde(default)]
        path: Option<String>,
    },
    /// Remote SurrealDB server over WebSocket, shared by several routers.
    Remote {
        endpoint: String,
        /// Falls back to `LOREKEEP_DB_USER`.
        #[serde(default)]
        username: Option<String>,
        /// Falls back to `LOREKEEP_DB_PASS`.
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_namespace")]
        namespace: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::Embedded { path: None }
    }
}

fn read_db_toml(path: &Path) -> Result<DbConfig, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    toml::from_str(&contents).map_err(|e| e.to_string())
}

/// Resolve where the feedback log lives, first match wins:
/// 1. `{data_path}/database.toml`
/// 2. `LOREKEEP_DB_URL` (remote)
/// 3. embedded `{data_path}/feedback.db`
pub fn load_db_config(data_path: &Path) -> DbConfig {
    let toml_path = data_path.join("database.toml");
    if toml_path.exists() {
        match read_db_toml(&toml_path) {
            Ok(config) => {
                tracing::info!(path = %toml_path.display(), "Using database.toml");
                return config;
            }
            Err(e) => tracing::warn!(
                path = %toml_path.display(),
                "Ignoring unusable database.toml: {}",
                e
            ),
        }
    }

    match std::env::var("LOREKEEP_DB_URL") {
        Ok(endpoint) => {
            tracing::info!("Using remote feedback database from LOREKEEP_DB_URL");
            DbConfig::Remote {
                endpoint,
                username: None,
                password: None,
                namespace: default_namespace(),
                database: default_database(),
            }
        }
        Err(_) => DbConfig::default(),
    }
}

fn credential(explicit: &Option<String>, var: &str) -> String {
    explicit
        .clone()
        .or_else(|| std::env::var(var).ok())
        .unwrap_or_else(|| "root".to_string())
}

/// Connect to the feedback database described by `config`.
pub async fn init_db(config: &DbConfig, data_path: &Path) -> Result<LorekeepDb, LorekeepError> {
    match config {
        DbConfig::Embedded { path } => {
            let location = match path {
                Some(p) => p.clone(),
                None => data_path.join("feedback.db").to_string_lossy().into_owned(),
            };
            let db = surrealdb::engine::any::connect(format!("rocksdb:{location}")).await?;
            db.use_ns(default_namespace())
                .use_db(default_database())
                .await?;
            Ok(db)
        }
        DbConfig::Remote {
            endpoint,
            username,
            password,
            namespace,
            database,
        } => {
            let db = surrealdb::engine::any::connect(endpoint).await?;
            let username = credential(username, "LOREKEEP_DB_USER");
            let password = credential(password, "LOREKEEP_DB_PASS");
            db.signin(surrealdb::opt::auth::Root {
                username: &username,
                password: &password,
            })
            .await?;
            db.use_ns(namespace).use_db(database).await?;
            Ok(db)
        }
    }
}
