//! Diff-based package installation with a live progress stream.
//!
//! [`PackageInstaller::install`] validates the request and resolves a session,
//! then hands back an [`InstallStream`] while a detached task drives the
//! installation:
//!
//! 1. read `package.json` and drop packages that are already dependencies
//! 2. stop the dev server and run the installer under a hard timeout,
//!    forwarding its output line by line
//! 3. re-read `package.json` to verify what actually landed
//! 4. restart the dev server and finish the stream

pub mod diff;
pub mod output;
pub mod stream;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DevboxError;
use crate::models::{package_name, InstallEventKind, InstallRequest};
use crate::provider::{OutputLine, ProviderError};
use crate::session::{scripts, Session, SessionRegistry};
pub use stream::{EventSink, InstallStream};

#[derive(Clone)]
pub struct PackageInstaller {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl PackageInstaller {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }

    /// Start installing `packages` into the current session.
    ///
    /// Validation and session lookup happen before this returns; everything
    /// after that is reported through the stream.
    pub async fn install<I, S>(
        &self,
        packages: I,
        sandbox_id: Option<&str>,
    ) -> Result<InstallStream, DevboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let request = InstallRequest::normalize(packages)?;
        let session = self.registry.resolve(sandbox_id).await?;

        let (sink, stream) = stream::channel();
        let config = self.config.clone();
        tokio::spawn(async move {
            run_install(session, request, config, sink).await;
        });
        Ok(stream)
    }
}

/// How the installer process ended.
#[derive(Debug)]
enum InstallerOutcome {
    Exited(i32),
    TimedOut,
    Crashed(ProviderError),
}

async fn run_install(
    session: Arc<Session>,
    request: InstallRequest,
    config: Arc<Config>,
    mut sink: EventSink,
) {
    if session.is_demo() {
        sink.emit(
            InstallEventKind::Start,
            format!("Installing {} package(s)", request.len()),
            Some(json!({ "requested": request.packages() })),
        )
        .await;
        sink.emit(
            InstallEventKind::Warning,
            "Demo session: no packages were installed",
            Some(json!({ "isDemo": true, "packages": request.packages() })),
        )
        .await;
        sink.complete("Demo session unchanged", Some(json!({ "isDemo": true })))
            .await;
        return;
    }

    let installed = read_installed(&session, &config).await;
    let dependency_diff = diff::partition(&request, &installed);

    if dependency_diff.missing.is_empty() {
        info!("All requested packages already installed in {}", session.id());
        sink.emit(
            InstallEventKind::Success,
            "All requested packages are already installed",
            Some(json!({
                "installed": Vec::<String>::new(),
                "alreadyInstalled": dependency_diff.satisfied,
            })),
        )
        .await;
        sink.complete("Nothing to install", None).await;
        return;
    }

    let missing = dependency_diff.missing;
    sink.emit(
        InstallEventKind::Start,
        format!("Installing {} package(s)", missing.len()),
        Some(json!({ "requested": request.packages() })),
    )
    .await;

    sink.emit(InstallEventKind::Status, "Stopping development server", None)
        .await;
    run_best_effort(&session, &scripts::stop_dev_server(), &config, "stop dev server").await;

    sink.emit(
        InstallEventKind::Status,
        "Checking installed dependencies",
        Some(json!({ "alreadyInstalled": dependency_diff.satisfied })),
    )
    .await;
    sink.emit(
        InstallEventKind::Info,
        format!("Packages to install: {}", missing.join(", ")),
        Some(json!({ "packages": missing })),
    )
    .await;

    info!("Installing {} into {}", missing.join(" "), session.id());
    match run_installer(&session, &config, &missing, &mut sink).await {
        InstallerOutcome::Exited(code) => {
            if code != 0 {
                sink.emit(
                    InstallEventKind::Error,
                    format!("Installer exited with code {}", code),
                    Some(json!({ "exitCode": code })),
                )
                .await;
            }
            verify(&session, &config, &missing, &mut sink).await;
            restart_dev_server(&session, &config).await;
            sink.complete("Installation finished", None).await;
        }
        InstallerOutcome::TimedOut => {
            warn!("Install timed out in {}", session.id());
            run_best_effort(&session, &scripts::kill_installer(), &config, "kill installer").await;
            restart_dev_server(&session, &config).await;
            let err = DevboxError::Timeout {
                operation: "package install",
                after: config.install_timeout,
            };
            sink.fail(
                err.to_string(),
                Some(json!({
                    "reason": "timeout",
                    "timeoutSecs": config.install_timeout.as_secs(),
                    "packages": missing,
                })),
            )
            .await;
        }
        InstallerOutcome::Crashed(e) => {
            warn!("Installer failed in {}: {}", session.id(), e);
            restart_dev_server(&session, &config).await;
            let err = DevboxError::Install {
                message: e.to_string(),
                packages: missing,
            };
            let mut details = err.details();
            details["code"] = json!(err.code());
            details["reason"] = json!("crash");
            sink.fail(err.to_string(), Some(details)).await;
        }
    }
}

/// Run the installer, forwarding output until it exits or the deadline hits.
async fn run_installer(
    session: &Session,
    config: &Config,
    packages: &[String],
    sink: &mut EventSink,
) -> InstallerOutcome {
    let script = scripts::install_packages(session.project_dir(), packages);
    let timeout = config.install_timeout;
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<OutputLine>();

    let drive = async {
        let exec = session.sandbox().exec_streaming(&script, timeout, line_tx);
        tokio::pin!(exec);
        let mut result = None;
        let mut lines_open = true;

        loop {
            if !lines_open {
                if let Some(result) = result.take() {
                    break result;
                }
            }
            tokio::select! {
                line = line_rx.recv(), if lines_open => match line {
                    Some(line) => forward_line(sink, &line).await,
                    None => lines_open = false,
                },
                res = &mut exec, if result.is_none() => result = Some(res),
            }
        }
    };

    match tokio::time::timeout(timeout, drive).await {
        Err(_) => InstallerOutcome::TimedOut,
        Ok(Ok(output)) => InstallerOutcome::Exited(output.exit_code),
        Ok(Err(ProviderError::Timeout(_))) => InstallerOutcome::TimedOut,
        Ok(Err(e)) => InstallerOutcome::Crashed(e),
    }
}

async fn forward_line(sink: &mut EventSink, line: &OutputLine) {
    if let Some((kind, conflict)) = output::classify(line) {
        let data = conflict.then(|| json!({ "conflict": true }));
        sink.emit(kind, line.text.trim(), data).await;
    }
}

/// Report which of `requested` are now dependencies.
async fn verify(session: &Session, config: &Config, requested: &[String], sink: &mut EventSink) {
    let installed = read_installed(session, config).await;
    let (present, missing): (Vec<String>, Vec<String>) = requested
        .iter()
        .cloned()
        .partition(|spec| installed.contains(package_name(spec)));

    if missing.is_empty() {
        sink.emit(
            InstallEventKind::Success,
            format!("Installed {}", present.join(", ")),
            Some(json!({ "installed": present, "partial": false })),
        )
        .await;
    } else if !present.is_empty() {
        sink.emit(
            InstallEventKind::Success,
            format!(
                "Installed {}; still missing {}",
                present.join(", "),
                missing.join(", ")
            ),
            Some(json!({ "installed": present, "missing": missing, "partial": true })),
        )
        .await;
    } else {
        let err = DevboxError::Install {
            message: "none of the requested packages were installed".to_string(),
            packages: missing,
        };
        let mut details = err.details();
        details["code"] = json!(err.code());
        sink.emit(InstallEventKind::Error, err.to_string(), Some(details))
            .await;
    }
}

/// Dependency names from the session's `package.json`; empty if unreadable.
async fn read_installed(session: &Session, config: &Config) -> BTreeSet<String> {
    let script = scripts::read_package_json(session.project_dir());
    match session.sandbox().exec(&script, config.command_timeout).await {
        Ok(output) if output.success() => diff::installed_packages(&output.stdout),
        Ok(output) => {
            warn!(
                "Reading package.json exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
            BTreeSet::new()
        }
        Err(e) => {
            warn!("Failed to read package.json: {}", e);
            BTreeSet::new()
        }
    }
}

/// Stop any running dev server, pause, relaunch it and touch the build
/// configuration so new dependencies are picked up.
async fn restart_dev_server(session: &Session, config: &Config) {
    let dir = session.project_dir();
    run_best_effort(session, &scripts::stop_dev_server(), config, "stop dev server").await;
    tokio::time::sleep(config.restart_pause).await;
    run_best_effort(session, &scripts::start_dev_server(dir), config, "start dev server").await;
    run_best_effort(session, &scripts::touch_config(dir), config, "touch config").await;
}

async fn run_best_effort(session: &Session, script: &str, config: &Config, label: &str) {
    match session.sandbox().exec(script, config.command_timeout).await {
        Ok(output) if !output.success() => {
            warn!("'{}' exited with {}", label, output.exit_code);
        }
        Ok(_) => {}
        Err(e) => warn!("'{}' failed: {}", label, e),
    }
}
