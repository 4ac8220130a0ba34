//! Execution engine
//!
//! Runs one loaded module against one record under a wall-clock deadline.
//! The script runs on tokio's blocking pool while the caller waits on a
//! timer. When the timer wins the caller gets [`ScriptError::Timeout`]
//! immediately and the module's watchdog stops the script at the same
//! deadline, so a runaway loop never keeps its worker forever.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

mod context;

pub use context::{EvaluationContext, FieldValue, HostFunction, ScriptConsumer};

use crate::error::ScriptError;
use crate::modules::{Fault, LoadedModule};

/// Deadline applied when nothing else is configured
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(100);

/// Evaluate `module` against `context`, bounded by `deadline`
///
/// `Ok(None)` means the script finished without producing a value.
pub async fn evaluate(
    module: Arc<LoadedModule>,
    context: EvaluationContext,
    deadline: Duration,
) -> Result<Option<serde_json::Value>, ScriptError> {
    let record_id = context.record_id();
    let started = Instant::now();
    let expires_at = started.checked_add(deadline);

    let worker = tokio::task::spawn_blocking(move || module.invoke(&context, expires_at));

    let outcome = match tokio::time::timeout(deadline, worker).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            return Err(ScriptError::Evaluation {
                record_id,
                message: format!("evaluation worker failed: {}", join_error),
            })
        }
        Err(_) => Err(Fault::Interrupted),
    };

    match outcome {
        Ok(None) => {
            debug!(record_id, "script produced no value");
            Ok(None)
        }
        Ok(Some(json)) => {
            let value = serde_json::from_str(&json).map_err(|e| ScriptError::Evaluation {
                record_id,
                message: format!("invalid script result: {}", e),
            })?;
            debug!(
                record_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "record evaluated"
            );
            Ok(Some(value))
        }
        Err(Fault::Interrupted) => {
            warn!(
                operation = "evaluate",
                status = "timeout",
                record_id,
                deadline_ms = deadline.as_millis() as u64,
                "evaluation exceeded its deadline"
            );
            Err(ScriptError::Timeout {
                record_id,
                deadline,
            })
        }
        Err(Fault::Thrown(message)) => {
            warn!(
                operation = "evaluate",
                status = "error",
                record_id,
                "{}",
                message
            );
            Err(ScriptError::Evaluation { record_id, message })
        }
    }
}
