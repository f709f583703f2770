use std::sync::Arc;
use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use super::manager::BybitWebSocketManager;

const SWEEP_INTERVAL: Duration = Duration::from_millis(500);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const CLEANUP_MAX_AGE: Duration = Duration::from_secs(900);
const HIGH_CPU_THRESHOLD: f32 = 95.0;
const HIGH_CPU_GRACE: Duration = Duration::from_secs(5);

/**
 * The manager's maintenance worker, running at roughly 2 Hz.
 *
 * Each iteration sweeps the stream statistics (peak rates, histogram
 * trimming, global receiving speed), observes the process CPU and, every
 * 60 seconds when enabled, garbage-collects streams that have been stopped
 * or crashed for more than 15 minutes.
 */
pub(super) async fn run_maintenance(manager: Arc<BybitWebSocketManager>) {
    info!("Maintenance worker started");
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();
    let mut high_cpu_since: Option<tokio::time::Instant> = None;
    let mut last_cleanup = tokio::time::Instant::now();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        sweep.tick().await;
        if manager.is_manager_stopping() {
            break;
        }

        manager.run_maintenance_pass();

        if let Some(pid) = pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                let cpu = process.cpu_usage();
                if cpu >= HIGH_CPU_THRESHOLD {
                    let since = high_cpu_since.get_or_insert_with(tokio::time::Instant::now);
                    if since.elapsed() >= HIGH_CPU_GRACE {
                        warn!(
                            cpu_percent = cpu,
                            "Process CPU usage has stayed at 95% or above for over 5 seconds"
                        );
                    }
                } else {
                    high_cpu_since = None;
                }
            }
        }

        if manager.config.auto_data_cleanup_stopped_streams
            && last_cleanup.elapsed() >= CLEANUP_INTERVAL
        {
            last_cleanup = tokio::time::Instant::now();
            let removed = manager.cleanup_stopped_streams(CLEANUP_MAX_AGE);
            if removed > 0 {
                debug!(removed, "Stopped streams garbage-collected");
            }
        }
    }
    info!("Maintenance worker stopped");
}
