use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the database path
pub const DATABASE_ENV: &str = "RANKMIGRATOR_DATABASE";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigratorConfig {
    pub database: Option<String>,
    pub keep_existing: Option<bool>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rankmigrator.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("devcordbot.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<MigratorConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: MigratorConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Pick the database path: CLI flag, then environment, then config file
pub fn resolve_database(
    cli: Option<PathBuf>,
    env: Option<String>,
    config: Option<&MigratorConfig>,
) -> PathBuf {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or_else(|| config.and_then(|c| c.database.as_ref()).map(PathBuf::from))
        .unwrap_or_else(default_database_path)
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
