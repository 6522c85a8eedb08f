use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, coded_issue};
use crate::reorg::checkpoint;
use crate::reorg::config::{FolioConfig, github_token, load_config};
use crate::reorg::lock::{pid_alive, read_lock_info};
use crate::reorg::paths::{FolioPaths, resolve_paths};

include!(concat!(env!("OUT_DIR"), "/folio_env_allowlist.rs"));

/// `FOLIO_*` variables set in the environment that nothing reads; usually typos.
fn unrecognized_env_keys<I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut unknown: Vec<String> = keys
        .into_iter()
        .filter(|key| key.starts_with("FOLIO_"))
        .filter(|key| !GENERATED_FOLIO_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect();
    unknown.sort();
    unknown
}

fn describe_store(cfg: &FolioConfig, report: &mut CommandReport) {
    let store = &cfg.store;
    report.detail(format!("store_backend={}", store.backend));
    if cfg.uses_local_backend() {
        report.detail(format!("local_root={}", store.local_root));
        return;
    }
    report.detail(format!("github_repo={}/{}", store.owner, store.repo));
    report.detail(format!("github_branch={}", store.branch));
    report.detail(format!("github_api_base={}", store.api_base));
    report.detail(format!("proxy_configured={}", !store.proxy_url.is_empty()));
    report.detail(format!("token_configured={}", github_token().is_some()));
    report.detail(format!(
        "retry={}x{}ms",
        cfg.retry.max_attempts, cfg.retry.base_backoff_ms
    ));
    if store.proxy_url.is_empty() && github_token().is_none() {
        report.issue("no write credential: set FOLIO_GITHUB_TOKEN or FOLIO_PROXY_URL");
    }
}

fn describe_run_state(paths: &FolioPaths, report: &mut CommandReport) -> Result<()> {
    let lock_path = paths.lock_file();
    match read_lock_info(&lock_path)? {
        Some(holder) if pid_alive(holder.pid) => {
            report.detail(format!(
                "run=active pid={} since={}",
                holder.pid, holder.started_at
            ));
            if holder.build_uuid != env!("BUILD_UUID") {
                report.detail(format!("run_build_uuid={}", holder.build_uuid));
            }
        }
        Some(holder) => report.detail(format!("run=stale-lock pid={}", holder.pid)),
        None => report.detail("run=idle"),
    }

    if paths.cancel_file().exists() {
        report.detail("cancel_requested=true");
    }

    match checkpoint::peek(&paths.checkpoint_file())? {
        Some(summary) => report.detail(format!(
            "checkpoint={}/{} artworks done, started {} (resume with `folio reorganize --resume`)",
            summary.completed, summary.total, summary.started_at
        )),
        None => report.detail("checkpoint=none"),
    }
    Ok(())
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("folio_home={}", paths.folio_home.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("reports_dir={}", paths.reports_dir.display()));

    match load_config() {
        Ok(cfg) => describe_store(&cfg, &mut report),
        Err(err) => coded_issue(&mut report, err)?,
    }

    describe_run_state(&paths, &mut report)?;

    for key in unrecognized_env_keys(env::vars().map(|(key, _)| key)) {
        report.detail(format!("unrecognized environment variable {key}"));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_covers_the_variables_we_read() {
        for key in ["FOLIO_HOME", "FOLIO_GITHUB_TOKEN", "FOLIO_STORE_BACKEND", "FOLIO_LOG"] {
            assert!(GENERATED_FOLIO_ENV_ALLOWLIST.contains(&key), "{key}");
        }
    }

    #[test]
    fn typos_are_reported_once_sorted() {
        // Built at runtime so the build script does not pick the typos up.
        let typo = |suffix: &str| format!("FOLIO_{suffix}");
        let unknown = unrecognized_env_keys(vec![
            typo("GITHUB_TOKN"),
            "PATH".to_string(),
            "FOLIO_HOME".to_string(),
            typo("BRANCH"),
        ]);
        assert_eq!(unknown, vec![typo("BRANCH"), typo("GITHUB_TOKN")]);
    }
}
