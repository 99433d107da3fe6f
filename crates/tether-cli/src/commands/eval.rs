//! `tether eval` — evaluate inline code

use std::path::Path;
use termcolor::ColorChoice;

pub fn execute(
    code: &str,
    config: Option<&Path>,
    wait_ms: u64,
    choice: ColorChoice,
) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    super::evaluate(code, config, wait_ms, choice)
}
