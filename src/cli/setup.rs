use crate::core::config::AppConfig;
use anyhow::{Context, Result, bail};
use std::path::Path;

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");
const EXAMPLE_ACCOUNT_LINE: &str = "default_account: \"main\"";

fn render_config(default_account: Option<&str>) -> Result<String> {
    match default_account.map(str::trim) {
        None => Ok(EXAMPLE_CONFIG.to_string()),
        Some("") => bail!("Account id must not be empty"),
        Some(id) => Ok(EXAMPLE_CONFIG.replacen(
            EXAMPLE_ACCOUNT_LINE,
            &format!("default_account: {}", serde_json::to_string(id)?),
            1,
        )),
    }
}

/// Writes the example configuration to the platform config directory.
pub fn setup(default_account: Option<&str>) -> Result<()> {
    let path = AppConfig::default_config_path()?;
    setup_at_path(path, default_account)
}

/// Writes the example configuration to `path`, optionally naming the default
/// account. Never overwrites an existing file.
pub fn setup_at_path<P: AsRef<Path>>(path: P, default_account: Option<&str>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        bail!("Configuration file already exists at {}", path.display());
    }

    let content = render_config(default_account)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    println!("Created configuration at {}", path.display());
    Ok(())
}
