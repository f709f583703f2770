use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::errors::RestartDecision;
use super::manager::BybitWebSocketManager;
use super::socket;

const RESTART_YIELD: Duration = Duration::from_millis(100);

/**
 * Per-stream supervisor loop.
 *
 * Runs one socket worker at a time and classifies every exit:
 *
 * ```text
 * starting ──connect ok──► running ──read/write loop──► (closed/error)
 *                                           │
 *                                           ├─ clean close / stop request ─► stopped
 *                                           ├─ crash request / fatal      ─► crashed
 *                                           └─ transient                  ─► restarting ─► starting
 * ```
 *
 * A restart yields 100 ms between attempts; the connect phase itself is
 * bounded by the manager's restart timeout inside the worker. Terminal
 * transitions emit their signal exactly once and end the task.
 */
#[instrument(skip(manager))]
pub(super) async fn run_stream(manager: Arc<BybitWebSocketManager>, stream_id: String) {
    info!(stream_id = %stream_id, "Stream supervisor started");
    loop {
        if manager.is_manager_stopping() || manager.is_stop_request(&stream_id) {
            manager.stream_is_stopping(&stream_id);
            break;
        }
        if manager.is_crash_request(&stream_id) {
            manager.stream_is_crashing(&stream_id, None);
            break;
        }

        let failure = socket::run_socket(&manager, &stream_id).await;
        match failure.decision() {
            RestartDecision::Stop => {
                manager.stream_is_stopping(&stream_id);
                break;
            }
            RestartDecision::Crash => {
                manager.stream_is_crashing(&stream_id, Some(failure.to_string()));
                break;
            }
            RestartDecision::Restart => {
                manager.stream_is_restarting(&stream_id, Some(failure.to_string()));
            }
        }
        tokio::time::sleep(RESTART_YIELD).await;
    }
    debug!(stream_id = %stream_id, "Stream supervisor finished");
}
