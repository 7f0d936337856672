//! Turns component calls into branch results.
//!
//! Errors and panics never escape a branch: they are recorded in the
//! branch's step result and become `false`.

use crate::cancellation::CancellationToken;
use crate::errors::BuildflowResult;
use crate::report::StepResultHandle;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Runs one component call and records its failure in `step`.
///
/// `failure` turns the error text into the step's failure reason.
pub(crate) async fn guarded<F>(
    step: &StepResultHandle,
    cancel: &CancellationToken,
    failure: impl FnOnce(&str) -> String,
    call: F,
) -> bool
where
    F: Future<Output = BuildflowResult<()>>,
{
    if cancel.is_cancelled() {
        step.lock().set_failed(cancelled_reason(cancel));
        return false;
    }

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => step.lock().is_successful(),
        Ok(Err(err)) if err.is_cancelled() => {
            step.lock().set_failed(cancelled_reason(cancel));
            false
        }
        Ok(Err(err)) => {
            let reason = failure(&err.to_string());
            step.lock().add_exception(&err, reason);
            false
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let reason = failure(&format!("panicked: {message}"));
            step.lock().add_panic(&message, reason);
            false
        }
    }
}

pub(crate) fn cancelled_reason(cancel: &CancellationToken) -> String {
    format!("Cancelled: {}", cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
