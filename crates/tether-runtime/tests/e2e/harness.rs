//! Test harness for end-to-end bridge tests
//!
//! Provides a runtime over a host with the sample classes registered and
//! helpers for evaluating source and checking results.

use std::sync::Arc;
use std::time::Duration;
use tether_host::sample::register_sample_classes;
use tether_host::HostEnvironment;
use tether_runtime::{
    BridgeConfig, BridgeError, BridgeResult, Channel, IsolateRuntime, RecordingServices,
    ResultHandle,
};
use tether_script::ContextId;

/// A runtime plus the pieces tests poke at directly
pub struct Harness {
    pub host: Arc<HostEnvironment>,
    pub runtime: Arc<IsolateRuntime>,
    pub services: Arc<RecordingServices>,
    pub ctx: ContextId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let host = Arc::new(HostEnvironment::new(config.host_config()));
        register_sample_classes(&host);
        Self::with_host(host, config)
    }

    /// Runtime over a host the test has already populated
    pub fn with_host(host: Arc<HostEnvironment>, config: BridgeConfig) -> Self {
        let services = Arc::new(RecordingServices::new());
        let runtime = IsolateRuntime::with_services(host.clone(), config, services.clone());
        let ctx = runtime
            .default_context()
            .expect("failed to initialize runtime");
        Self {
            host,
            runtime,
            services,
            ctx,
        }
    }

    pub fn eval(&self, source: &str) -> BridgeResult<ResultHandle> {
        self.runtime.evaluate(self.ctx, source)
    }

    /// Run every main-loop message that is due now
    pub fn pump(&self) -> usize {
        self.host.main_loop().run_pending()
    }

    /// Pump until the queue drains or `ms` elapse
    pub fn pump_for(&self, ms: u64) -> usize {
        self.host.main_loop().run_until_idle(Duration::from_millis(ms))
    }

    pub fn logs(&self) -> Vec<String> {
        self.services.channel(Channel::Log)
    }

    pub fn errors(&self) -> Vec<String> {
        self.services.channel(Channel::Error)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `source` in a fresh harness
pub fn eval(source: &str) -> BridgeResult<ResultHandle> {
    Harness::new().eval(source)
}

pub fn expect_i32(source: &str, expected: i32) {
    match eval(source).and_then(|r| r.to_integer()) {
        Ok(actual) => assert_eq!(actual, expected, "Source: {}", source),
        Err(e) => panic!("Evaluation failed: {}\nSource: {}", e, source),
    }
}

pub fn expect_f64(source: &str, expected: f64) {
    match eval(source).and_then(|r| r.to_double()) {
        Ok(actual) => assert!(
            (actual - expected).abs() < 1e-9,
            "Expected {}, got {}\nSource: {}",
            expected,
            actual,
            source
        ),
        Err(e) => panic!("Evaluation failed: {}\nSource: {}", e, source),
    }
}

pub fn expect_bool(source: &str, expected: bool) {
    match eval(source).and_then(|r| r.to_bool()) {
        Ok(actual) => assert_eq!(actual, expected, "Source: {}", source),
        Err(e) => panic!("Evaluation failed: {}\nSource: {}", e, source),
    }
}

pub fn expect_string(source: &str, expected: &str) {
    match eval(source).and_then(|r| r.to_string()) {
        Ok(actual) => assert_eq!(actual, expected, "Source: {}", source),
        Err(e) => panic!("Evaluation failed: {}\nSource: {}", e, source),
    }
}

/// Expect evaluation to fail with a bridge error of `kind`
pub fn expect_error_kind(source: &str, kind: &str) -> BridgeError {
    match eval(source) {
        Ok(_) => panic!("Expected {} but evaluation succeeded\nSource: {}", kind, source),
        Err(e) => {
            assert_eq!(e.kind(), kind, "Unexpected error {:?}\nSource: {}", e, source);
            e
        }
    }
}

/// Expect evaluation to fail with a message containing `pattern`
pub fn expect_runtime_error(source: &str, pattern: &str) {
    match eval(source) {
        Ok(_) => panic!("Expected error containing '{}'\nSource: {}", pattern, source),
        Err(e) => assert!(
            e.to_string().contains(pattern),
            "Expected error containing '{}', got: {}\nSource: {}",
            pattern,
            e,
            source
        ),
    }
}
