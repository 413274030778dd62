//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use pipewright::{Context, Pipeline, PipelineResult, RunSummary};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for any single pipeline run in tests
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Run `pipeline` on a helper thread, panicking if it does not return in time.
pub fn run_with_timeout<T: Send + 'static>(
    pipeline: &Arc<Pipeline<T>>,
    ctx: &Context,
) -> PipelineResult<RunSummary> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let pipeline = Arc::clone(pipeline);
    let ctx = ctx.clone();
    thread::spawn(move || {
        let _ = tx.send(pipeline.run(&ctx));
    });
    rx.recv_timeout(test_timeout())
        .expect("pipeline run did not finish in time")
}

/// Poll `condition` until it holds or the test timeout expires.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}
