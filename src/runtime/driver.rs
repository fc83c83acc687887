//! Render drivers
//!
//! The VM itself never awaits; it stops with `Control::Suspend` and the
//! driver resolves the pending value before resuming it.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Failure, RenderError};

use super::exec_loop::run_until_done;
use super::vm::{Control, VM};
use super::Value;

/// Run a program that never suspends
pub fn run_sync(mut vm: VM) -> Result<Value, RenderError> {
    run_until_done(&mut vm);
    if vm.is_suspended() {
        return Err(RenderError::Internal(
            "synchronous render reached a suspension point".to_string(),
        ));
    }
    vm.finish()
}

/// Run a program to completion, awaiting every suspension point
///
/// Cancelling `cancel` while the render is suspended fails the pending value
/// with a cancellation, which no guard intercepts.
pub async fn run_async(mut vm: VM, cancel: &CancellationToken) -> Result<Value, RenderError> {
    loop {
        if cancel.is_cancelled() {
            debug!(pc = vm.pc, "render cancelled before resuming");
            vm.resume(Err(Failure::cancelled()));
        }
        run_until_done(&mut vm);

        let Control::Suspend(awaitable) = vm.control.clone() else {
            return vm.finish();
        };
        let future = match awaitable.take() {
            Ok(future) => future,
            Err(failure) => {
                vm.resume(Err(failure));
                continue;
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(pc = vm.pc, id = awaitable.id(), "render cancelled while suspended");
                Err(Failure::cancelled())
            }
            result = future => result,
        };
        vm.resume(result);
    }
}
