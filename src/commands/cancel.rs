use anyhow::Result;

use crate::commands::CommandReport;
use crate::reorg::lock::{pid_alive, read_lock_info, request_cancel};
use crate::reorg::paths::resolve_paths;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("cancel");
    let lock_path = paths.lock_file();
    report.detail(format!("lock_file={}", lock_path.display()));

    let holder = match read_lock_info(&lock_path) {
        Ok(holder) => holder,
        Err(err) => {
            report.issue(format!("failed to read lock {}: {err:#}", lock_path.display()));
            return Ok(report);
        }
    };
    let Some(holder) = holder else {
        report.detail("no reorganization running (lock file not found)");
        return Ok(report);
    };
    report.detail(format!("run_pid={}", holder.pid));

    if !pid_alive(holder.pid) {
        report.detail(format!(
            "run pid {} is not running; nothing to cancel",
            holder.pid
        ));
        return Ok(report);
    }

    let request = request_cancel(&paths)?;
    report.detail(format!("cancel_request={}", request.display()));
    report.detail(format!(
        "cancellation requested; pid {} stops before its next artwork",
        holder.pid
    ));
    Ok(report)
}
