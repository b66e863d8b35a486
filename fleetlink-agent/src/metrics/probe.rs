//! Measurement strategy plumbing
//!
//! Every metric is collected through an ordered chain of [`Strategy`] units.
//! [`first_success`] walks the chain and returns the first value produced
//! without a failure, or the metric's documented default; it can never error
//! out of the metrics layer.
//!
//! Command and virtual-file probes are hard-bounded so a hung helper cannot
//! stall a sampling cycle.

use crate::error::SampleError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Hard bound for any single external command or file probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// One measurement method for a metric. Strategies are tried in priority
/// order; a failure just moves the chain along.
#[async_trait]
pub trait Strategy<T: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sample(&self) -> Result<T, SampleError>;
}

/// Run a strategy chain: first success wins, otherwise the documented default.
pub async fn first_success<T: Send>(
    metric: &str,
    strategies: &[Box<dyn Strategy<T>>],
    default: T,
) -> T {
    for strategy in strategies {
        match strategy.sample().await {
            Ok(value) => {
                debug!(metric, strategy = strategy.name(), "strategy succeeded");
                return value;
            }
            Err(err) => {
                debug!(metric, strategy = strategy.name(), %err, "strategy failed");
            }
        }
    }
    warn!(metric, "all strategies failed, reporting fallback default");
    default
}

/// Run an external command with the probe bound, returning its stdout.
pub async fn run_command(program: &str, args: &[&str]) -> Result<String, SampleError> {
    let output = timeout(
        PROBE_TIMEOUT,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| SampleError::Timeout(PROBE_TIMEOUT))??;

    if !output.status.success() {
        return Err(SampleError::Unavailable("command exited nonzero"));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Read a kernel-exported virtual file (`/proc`, `/sys`) with the probe bound.
pub async fn read_virtual_file(path: impl AsRef<Path>) -> Result<String, SampleError> {
    timeout(PROBE_TIMEOUT, tokio::fs::read_to_string(path))
        .await
        .map_err(|_| SampleError::Timeout(PROBE_TIMEOUT))?
        .map_err(SampleError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fails;
    struct Yields(u32);

    #[async_trait]
    impl Strategy<u32> for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        async fn sample(&self) -> Result<u32, SampleError> {
            Err(SampleError::Unavailable("synthetic failure"))
        }
    }

    #[async_trait]
    impl Strategy<u32> for Yields {
        fn name(&self) -> &'static str {
            "yields"
        }

        async fn sample(&self) -> Result<u32, SampleError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn first_strategy_wins() {
        let chain: Vec<Box<dyn Strategy<u32>>> =
            vec![Box::new(Yields(1)), Box::new(Yields(2))];
        assert_eq!(first_success("m", &chain, 99).await, 1);
    }

    #[tokio::test]
    async fn failures_fall_through_in_order() {
        let chain: Vec<Box<dyn Strategy<u32>>> =
            vec![Box::new(Fails), Box::new(Fails), Box::new(Yields(7))];
        assert_eq!(first_success("m", &chain, 99).await, 7);
    }

    #[tokio::test]
    async fn exhausted_chain_yields_the_default_deterministically() {
        let chain: Vec<Box<dyn Strategy<u32>>> = vec![Box::new(Fails), Box::new(Fails)];
        for _ in 0..3 {
            assert_eq!(first_success("m", &chain, 42).await, 42);
        }
    }

    #[tokio::test]
    async fn empty_chain_yields_the_default() {
        let chain: Vec<Box<dyn Strategy<u32>>> = Vec::new();
        assert_eq!(first_success("m", &chain, 5).await, 5);
    }

    #[tokio::test]
    async fn missing_command_is_a_strategy_failure() {
        let result = run_command("fleetlink-no-such-command", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_virtual_file_is_a_strategy_failure() {
        let result = read_virtual_file("/nonexistent/fleetlink").await;
        assert!(matches!(result, Err(SampleError::Io(_))));
    }
}
