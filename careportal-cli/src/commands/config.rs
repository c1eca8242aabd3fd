use std::fs;
use std::io::Write;

use anyhow::{Context, Result, bail};
use shared::config::client::Config;

/// Writes the default configuration to `config.yaml` or `config.json` in the
/// current directory.
///
/// # Errors
/// Returns an error if the format is unsupported or the file cannot be written.
pub fn generate_config(format: &str) -> Result<()> {
    let config = Config::with_defaults();
    let (file_name, serialized) = match format {
        "yaml" => ("config.yaml", serde_yml::to_string(&config)?),
        "json" => ("config.json", serde_json::to_string_pretty(&config)?),
        _ => bail!("Unsupported format. Use 'yaml' or 'json'."),
    };

    let mut file =
        fs::File::create(file_name).with_context(|| format!("failed to create {file_name}"))?;
    file.write_all(serialized.as_bytes())?;

    println!("Configuration file '{file_name}' generated successfully.");
    Ok(())
}
