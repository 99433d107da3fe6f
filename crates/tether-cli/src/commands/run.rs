//! `tether run` — evaluate a script file

use anyhow::Context;
use std::path::Path;
use termcolor::ColorChoice;

pub fn execute(
    file: &Path,
    config: Option<&Path>,
    wait_ms: u64,
    choice: ColorChoice,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let config = super::load_config(config)?;
    tracing::info!(file = %file.display(), "running script");
    super::evaluate(&source, config, wait_ms, choice)
}
