//! Subcommands and the evaluation session they share

pub mod classes;
pub mod eval;
pub mod run;

use crate::output::StyledOutput;
use anyhow::{anyhow, Context};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_host::sample::register_sample_classes;
use tether_host::HostEnvironment;
use tether_runtime::{BridgeConfig, BridgeError, HostServices, IsolateRuntime, ResultHandle};
use termcolor::ColorChoice;

/// Script output goes straight to the terminal
struct ConsoleServices;

impl HostServices for ConsoleServices {
    fn notify(&self, text: &str) {
        println!("[notify] {}", text);
    }

    fn log(&self, text: &str) {
        println!("{}", text);
    }

    fn error(&self, text: &str) {
        eprintln!("{}", text);
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(BridgeConfig::default()),
    }
}

/// Host with the sample classes registered
pub fn sample_host(config: &BridgeConfig) -> Arc<HostEnvironment> {
    let host = Arc::new(HostEnvironment::new(config.host_config()));
    register_sample_classes(&host);
    host
}

fn bridge_error(err: BridgeError) -> anyhow::Error {
    anyhow!("{}: {}", err.kind(), err)
}

/// Completion value as printed; nothing for `undefined`. Objects print as
/// JSON unless they have no JSON form.
fn render(result: &ResultHandle) -> Result<Option<String>, BridgeError> {
    match result.type_of()? {
        "undefined" => Ok(None),
        "object" => match result.to_json() {
            Ok(json) => Ok(Some(json.to_string())),
            Err(BridgeError::TypeMismatch { .. }) => result.to_string().map(Some),
            Err(err) => Err(err),
        },
        _ => result.to_string().map(Some),
    }
}

/// Evaluate `source`, pump the main loop for up to `wait_ms` and print the
/// completion value
pub fn evaluate(
    source: &str,
    config: BridgeConfig,
    wait_ms: u64,
    choice: ColorChoice,
) -> anyhow::Result<()> {
    let host = sample_host(&config);
    let runtime = IsolateRuntime::with_services(host.clone(), config, Arc::new(ConsoleServices));
    let context = runtime.default_context().map_err(bridge_error)?;

    let result = runtime.evaluate(context, source).map_err(bridge_error)?;
    let rendered = render(&result).map_err(bridge_error)?;
    drop(result);

    let ran = host.main_loop().run_until_idle(Duration::from_millis(wait_ms));
    let pending = runtime.timers().active();
    tracing::debug!(ran, pending, "main loop pumped");

    let mut out = StyledOutput::new(choice);
    if let Some(text) = rendered {
        out.info(&text);
        out.newline();
    }
    if pending > 0 {
        out.notice(&format!(
            "{} timer(s) still pending after {} ms",
            pending, wait_ms
        ));
        out.newline();
    }
    out.flush();

    runtime.shutdown();
    Ok(())
}
