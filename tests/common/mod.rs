//! Scripted in-memory sandbox provider shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::mpsc;

use devbox::provider::{
    CreateSandbox, ExecOutput, OutputLine, ProviderError, SandboxHandle, SandboxProvider,
};
use devbox::Config;

pub const PROJECT_DIR: &str = "/home/user/app";

/// Knobs for how the fake behaves.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub fail_create: bool,
    pub fail_writes: bool,
    /// `connect` never answers.
    pub hang_connect: bool,
    /// How long `npm install` takes.
    pub install_delay: Option<Duration>,
    /// The installer connection drops instead of finishing.
    pub crash_install: bool,
    /// Packages the installer silently fails to add.
    pub failing_packages: HashSet<String>,
    /// Extra lines printed by the installer before it exits.
    pub install_lines: Vec<OutputLine>,
}

#[derive(Debug, Default)]
struct State {
    next_id: usize,
    live: HashSet<String>,
    files: HashMap<String, BTreeMap<String, String>>,
    creates: usize,
    kills: HashMap<String, usize>,
    installs: Vec<Vec<String>>,
    scripts: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeProvider {
    behavior: Mutex<Behavior>,
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            state: Mutex::default(),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn kills(&self, id: &str) -> usize {
        self.state.lock().unwrap().kills.get(id).copied().unwrap_or(0)
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.state.lock().unwrap().live.contains(id)
    }

    /// Package lists passed to each `npm install <pkgs>` run.
    pub fn installs(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().installs.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn file(&self, id: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.files.get(id)?.get(&absolute(path)).cloned()
    }

    pub fn put_file(&self, id: &str, path: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .entry(id.to_string())
            .or_default()
            .insert(absolute(path), content.to_string());
    }

    /// Add a running sandbox that this process never created.
    pub fn seed_sandbox(&self, id: &str, files: &[(&str, &str)]) {
        let mut state = self.state.lock().unwrap();
        state.live.insert(id.to_string());
        let fs = state.files.entry(id.to_string()).or_default();
        for (path, content) in files {
            fs.insert(absolute(path), content.to_string());
        }
    }

    fn dependencies(&self, id: &str) -> BTreeMap<String, String> {
        self.file(id, "package.json")
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|json| json.get("dependencies").cloned())
            .and_then(|deps| serde_json::from_value(deps).ok())
            .unwrap_or_default()
    }

    fn enumerate(&self, id: &str) -> String {
        let engine = base64::engine::general_purpose::STANDARD;
        let state = self.state.lock().unwrap();
        let prefix = format!("{}/", PROJECT_DIR);
        let mut out = String::new();
        if let Some(fs) = state.files.get(id) {
            for (path, content) in fs {
                let Some(relative) = path.strip_prefix(&prefix) else {
                    continue;
                };
                out.push_str(&format!(
                    "FILE\t{}\t{}\t1700000000\t{}\n",
                    relative,
                    content.len(),
                    engine.encode(content)
                ));
            }
        }
        out
    }

    async fn run_install(
        &self,
        id: &str,
        script: &str,
        lines: Option<&mpsc::UnboundedSender<OutputLine>>,
    ) -> Result<ExecOutput, ProviderError> {
        let behavior = self.behavior();
        let packages = quoted_args(script.split("--loglevel=warn").nth(1).unwrap_or(""));
        self.state.lock().unwrap().installs.push(packages.clone());

        if let Some(delay) = behavior.install_delay {
            tokio::time::sleep(delay).await;
        }
        if behavior.crash_install {
            return Err(ProviderError::Server("connection reset by peer".to_string()));
        }

        let mut deps = self.dependencies(id);
        let mut failed = false;
        for spec in &packages {
            let name = devbox::models::package_name(spec).to_string();
            if behavior.failing_packages.contains(&name) {
                failed = true;
                continue;
            }
            deps.insert(name, "^1.0.0".to_string());
        }
        let package_json = serde_json::json!({ "name": "app", "dependencies": deps });
        self.put_file(id, "package.json", &package_json.to_string());

        let mut output = ExecOutput::default();
        let mut emitted = behavior.install_lines.clone();
        emitted.push(OutputLine::stdout(format!(
            "added {} packages in 1s",
            packages.len()
        )));
        for line in emitted {
            output.stdout.push_str(&line.text);
            output.stdout.push('\n');
            if let Some(tx) = lines {
                let _ = tx.send(line);
            }
        }
        if failed {
            output.exit_code = 1;
        }
        Ok(output)
    }

    async fn dispatch(
        &self,
        handle: &SandboxHandle,
        script: &str,
        lines: Option<&mpsc::UnboundedSender<OutputLine>>,
    ) -> Result<ExecOutput, ProviderError> {
        {
            let mut state = self.state.lock().unwrap();
            state.scripts.push(script.to_string());
            if !state.live.contains(&handle.id) {
                return Err(ProviderError::NotFound(handle.id.clone()));
            }
        }

        let ok = |stdout: String| -> Result<ExecOutput, ProviderError> {
            Ok(ExecOutput {
                stdout,
                ..Default::default()
            })
        };

        if script.contains("find .") {
            return ok(self.enumerate(&handle.id));
        }
        if script.contains("--loglevel=warn") {
            return self.run_install(&handle.id, script, lines).await;
        }
        if let Some(rest) = script.strip_prefix("cat ") {
            let path = quoted_args(rest).into_iter().next().unwrap_or_default();
            let state = self.state.lock().unwrap();
            return match state.files.get(&handle.id).and_then(|fs| fs.get(&path)) {
                Some(content) => ok(content.clone()),
                None => Ok(ExecOutput {
                    stderr: format!("cat: {}: No such file or directory", path),
                    exit_code: 1,
                    ..Default::default()
                }),
            };
        }
        if script.starts_with("test -d") {
            let state = self.state.lock().unwrap();
            let present = state
                .files
                .get(&handle.id)
                .is_some_and(|fs| fs.keys().any(|p| p.starts_with(PROJECT_DIR)));
            return if present {
                ok("ok\n".to_string())
            } else {
                Ok(ExecOutput {
                    exit_code: 1,
                    ..Default::default()
                })
            };
        }
        ok(String::new())
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn create(&self, _request: &CreateSandbox) -> Result<SandboxHandle, ProviderError> {
        if self.behavior().fail_create {
            return Err(ProviderError::Server("capacity exhausted".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        state.next_id += 1;
        let id = format!("sbx-{}", state.next_id);
        state.live.insert(id.clone());
        Ok(SandboxHandle {
            host: format!("{}.fake.test", id),
            id,
        })
    }

    async fn connect(&self, id: &str) -> Result<SandboxHandle, ProviderError> {
        if self.behavior().hang_connect {
            std::future::pending::<()>().await;
        }
        let state = self.state.lock().unwrap();
        if state.live.contains(id) {
            Ok(SandboxHandle {
                id: id.to_string(),
                host: format!("{}.fake.test", id),
            })
        } else {
            Err(ProviderError::NotFound(id.to_string()))
        }
    }

    async fn kill(&self, handle: &SandboxHandle) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        *state.kills.entry(handle.id.clone()).or_default() += 1;
        if state.live.remove(&handle.id) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(handle.id.clone()))
        }
    }

    async fn exec(
        &self,
        handle: &SandboxHandle,
        script: &str,
        _timeout: Duration,
    ) -> Result<ExecOutput, ProviderError> {
        self.dispatch(handle, script, None).await
    }

    async fn exec_streaming(
        &self,
        handle: &SandboxHandle,
        script: &str,
        _timeout: Duration,
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> Result<ExecOutput, ProviderError> {
        self.dispatch(handle, script, Some(&lines)).await
    }

    async fn write_files(
        &self,
        handle: &SandboxHandle,
        files: &[(String, String)],
        _timeout: Duration,
    ) -> Result<(), ProviderError> {
        if self.behavior().fail_writes {
            return Err(ProviderError::Server("disk full".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let fs = state.files.entry(handle.id.clone()).or_default();
        for (path, content) in files {
            fs.insert(path.clone(), content.clone());
        }
        Ok(())
    }
}

/// Single-quoted arguments in a shell fragment, unquoted.
fn quoted_args(fragment: &str) -> Vec<String> {
    fragment
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", PROJECT_DIR, path)
    }
}

/// Config for a live provider with no pauses.
pub fn test_config() -> Config {
    Config::offline()
        .with_api_key("test-key")
        .with_restart_pause(Duration::ZERO)
}
