// src/infra/paths.rs — Path management
//
// All paths respect the GOODQUESTION_HOME environment variable for isolation.
// When GOODQUESTION_HOME is set, config and data live under that directory.
// When unset, config uses ~/.goodquestion/ and data uses XDG_DATA_HOME/goodquestion.

use std::path::PathBuf;

/// Returns the GOODQUESTION_HOME override, if set.
fn goodquestion_home() -> Option<PathBuf> {
    std::env::var_os("GOODQUESTION_HOME").map(PathBuf::from)
}

/// Home directory. Falls back to the working directory when no home is resolvable.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $GOODQUESTION_HOME/ or ~/.goodquestion/
pub fn config_dir() -> PathBuf {
    if let Some(home) = goodquestion_home() {
        return home;
    }
    dirs_home().join(".goodquestion")
}

/// Data directory: $GOODQUESTION_HOME/data/ or ~/.local/share/goodquestion/
pub fn data_dir() -> PathBuf {
    if let Some(home) = goodquestion_home() {
        return home.join("data");
    }
    directories::ProjectDirs::from("", "", "goodquestion")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Database path
pub fn db_path() -> PathBuf {
    data_dir().join("goodquestion.db")
}

/// User prompt overrides: a `<name>.md` here replaces the built-in template.
pub fn prompts_dir() -> PathBuf {
    config_dir().join("prompts")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), prompts_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
