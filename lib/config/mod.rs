use std::env;

const DEFAULT_DB_PATH: &str = "mde_outbox.sqlite3";

pub struct Config {
    /// Path of the local outbox database file.
    pub db_path: String,
    /// Base URL of the warehouse backend. Optional: local-only commands
    /// (status, compact) never contact it.
    pub api_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = env::var("OUTBOX_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let api_base_url = env::var("WAREHOUSE_API_URL").ok();
        Self {
            db_path,
            api_base_url,
        }
    }
}
