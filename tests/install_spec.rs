mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{test_config, Behavior, FakeProvider};
use devbox::install::PackageInstaller;
use devbox::models::*;
use devbox::provider::{OutputLine, SandboxProvider};
use devbox::session::SessionRegistry;
use devbox::Config;

struct Harness {
    fake: Arc<FakeProvider>,
    registry: Arc<SessionRegistry>,
    installer: PackageInstaller,
}

fn harness_with(fake: Arc<FakeProvider>, config: Config) -> Harness {
    let config = Arc::new(config);
    let provider: Arc<dyn SandboxProvider> = fake.clone();
    let registry = Arc::new(SessionRegistry::new(Some(provider), config.clone()));
    Harness {
        installer: PackageInstaller::new(registry.clone(), config),
        fake,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(FakeProvider::new(), test_config())
}

impl Harness {
    async fn live_session(&self) -> String {
        self.registry
            .create(CreateSessionInput::default())
            .await
            .unwrap()
            .id()
            .to_string()
    }

    async fn install(&self, packages: &[&str]) -> Vec<InstallEvent> {
        self.installer
            .install(packages, None)
            .await
            .unwrap()
            .collect_all()
            .await
    }
}

fn kinds(events: &[InstallEvent]) -> Vec<InstallEventKind> {
    events.iter().map(|e| e.kind).collect()
}

fn assert_sequenced(events: &[InstallEvent]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64);
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn installed_packages_short_circuit() {
        let h = harness();
        h.live_session().await;

        let events = h.install(&["react"]).await;

        assert_eq!(
            kinds(&events),
            vec![InstallEventKind::Success, InstallEventKind::Complete]
        );
        let data = events[0].data.as_ref().unwrap();
        assert_eq!(data["installed"], serde_json::json!([]));
        assert_eq!(data["alreadyInstalled"], serde_json::json!(["react"]));
        assert!(h.fake.installs().is_empty());
    }

    #[tokio::test]
    async fn version_suffix_is_ignored_for_presence() {
        let h = harness();
        h.live_session().await;

        let events = h.install(&["react@19.0.0", "react-dom"]).await;

        assert_eq!(events.last().unwrap().kind, InstallEventKind::Complete);
        assert!(h.fake.installs().is_empty());
    }

    #[tokio::test]
    async fn second_install_of_same_package_runs_nothing() {
        let h = harness();
        h.live_session().await;

        h.install(&["lodash"]).await;
        let events = h.install(&["lodash"]).await;

        assert_eq!(h.fake.installs(), vec![vec!["lodash".to_string()]]);
        assert_eq!(
            kinds(&events),
            vec![InstallEventKind::Success, InstallEventKind::Complete]
        );
    }
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn installs_only_missing_packages_in_order() {
        let h = harness();
        h.live_session().await;

        let events = h.install(&["react", "lodash"]).await;

        assert_sequenced(&events);
        assert_eq!(
            kinds(&events),
            vec![
                InstallEventKind::Start,
                InstallEventKind::Status,
                InstallEventKind::Status,
                InstallEventKind::Info,
                InstallEventKind::Output,
                InstallEventKind::Success,
                InstallEventKind::Complete,
            ]
        );
        assert_eq!(events[1].message, "Stopping development server");
        assert_eq!(events[2].message, "Checking installed dependencies");
        assert_eq!(events[3].message, "Packages to install: lodash");
        assert_eq!(h.fake.installs(), vec![vec!["lodash".to_string()]]);
    }

    #[tokio::test]
    async fn installed_package_lands_in_package_json() {
        let h = harness();
        let id = h.live_session().await;

        let events = h.install(&["lodash"]).await;

        let success = events
            .iter()
            .find(|e| e.kind == InstallEventKind::Success)
            .unwrap();
        assert_eq!(
            success.data.as_ref().unwrap()["installed"],
            serde_json::json!(["lodash"])
        );
        assert!(h.fake.file(&id, "package.json").unwrap().contains("\"lodash\""));
    }

    #[tokio::test]
    async fn dev_server_restarts_after_install_before_complete() {
        let h = harness();
        h.live_session().await;
        let before = h.fake.scripts().len();

        h.install(&["lodash"]).await;

        let scripts = &h.fake.scripts()[before..];
        let install = scripts
            .iter()
            .position(|s| s.contains("--loglevel=warn"))
            .unwrap();
        let stop = scripts.iter().rposition(|s| s.contains("pkill -f 'vite'")).unwrap();
        let start = scripts
            .iter()
            .rposition(|s| s.contains("nohup npm run dev"))
            .unwrap();
        let touch = scripts
            .iter()
            .rposition(|s| s.contains("vite.config.js"))
            .unwrap();
        assert!(install < stop && stop < start && start < touch);
    }

    #[tokio::test]
    async fn installer_output_is_classified() {
        let fake = FakeProvider::with_behavior(Behavior {
            install_lines: vec![
                OutputLine::stdout("npm WARN deprecated inflight@1.0.6"),
                OutputLine::stdout("npm warn ERESOLVE overriding peer dependency"),
                OutputLine::stdout(""),
                OutputLine::stderr("something on stderr"),
            ],
            ..Default::default()
        });
        let h = harness_with(fake, test_config());
        h.live_session().await;

        let events = h.install(&["lodash"]).await;

        let streamed: Vec<&InstallEvent> = events[4..].iter().take(4).collect();
        assert_eq!(streamed[0].kind, InstallEventKind::Warning);
        assert!(streamed[0].data.is_none());
        assert_eq!(streamed[1].kind, InstallEventKind::Warning);
        assert_eq!(streamed[1].data.as_ref().unwrap()["conflict"], true);
        assert_eq!(streamed[2].kind, InstallEventKind::Warning);
        assert_eq!(streamed[2].message, "something on stderr");
        assert_eq!(streamed[3].kind, InstallEventKind::Output);
    }

    #[tokio::test]
    async fn reconnects_when_sandbox_id_given() {
        let h = harness();
        h.fake.seed_sandbox(
            "sbx-remote",
            &[("package.json", r#"{"dependencies":{"react":"^19.0.0"}}"#)],
        );

        let events = h
            .installer
            .install(["lodash"], Some("sbx-remote"))
            .await
            .unwrap()
            .collect_all()
            .await;

        assert_eq!(events.last().unwrap().kind, InstallEventKind::Complete);
        assert!(h
            .fake
            .file("sbx-remote", "package.json")
            .unwrap()
            .contains("lodash"));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn partial_install_reports_missing_and_completes() {
        let fake = FakeProvider::with_behavior(Behavior {
            failing_packages: HashSet::from(["left-pad-typo".to_string()]),
            ..Default::default()
        });
        let h = harness_with(fake, test_config());
        h.live_session().await;

        let events = h.install(&["lodash", "left-pad-typo"]).await;

        let error = events
            .iter()
            .find(|e| e.kind == InstallEventKind::Error)
            .unwrap();
        assert_eq!(error.data.as_ref().unwrap()["exitCode"], 1);

        let success = events
            .iter()
            .find(|e| e.kind == InstallEventKind::Success)
            .unwrap();
        let data = success.data.as_ref().unwrap();
        assert_eq!(data["partial"], true);
        assert_eq!(data["installed"], serde_json::json!(["lodash"]));
        assert_eq!(data["missing"], serde_json::json!(["left-pad-typo"]));
        assert_eq!(events.last().unwrap().kind, InstallEventKind::Complete);
    }

    #[tokio::test]
    async fn nothing_installed_reports_error_then_completes() {
        let fake = FakeProvider::with_behavior(Behavior {
            failing_packages: HashSet::from(["left-pad-typo".to_string()]),
            ..Default::default()
        });
        let h = harness_with(fake, test_config());
        h.live_session().await;

        let events = h.install(&["left-pad-typo"]).await;

        let errors: Vec<&InstallEvent> = events
            .iter()
            .filter(|e| e.kind == InstallEventKind::Error)
            .collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].data.as_ref().unwrap()["code"], "INSTALL_ERROR");
        assert_eq!(
            errors[1].data.as_ref().unwrap()["packages"],
            serde_json::json!(["left-pad-typo"])
        );
        assert!(!events.iter().any(|e| e.kind == InstallEventKind::Success));
        assert_eq!(events.last().unwrap().kind, InstallEventKind::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_kills_installer_and_ends_with_error() {
        let fake = FakeProvider::with_behavior(Behavior {
            install_delay: Some(Duration::from_secs(600)),
            ..Default::default()
        });
        let h = harness_with(
            fake,
            test_config().with_install_timeout(Duration::from_secs(60)),
        );
        h.live_session().await;
        let before = h.fake.scripts().len();

        let events = h.install(&["lodash"]).await;

        let last = events.last().unwrap();
        assert_eq!(last.kind, InstallEventKind::Error);
        assert!(last.is_terminal());
        assert_eq!(last.data.as_ref().unwrap()["reason"], "timeout");
        assert!(!events.iter().any(|e| e.kind == InstallEventKind::Complete));

        let scripts = &h.fake.scripts()[before..];
        assert!(scripts.iter().any(|s| s.contains("pkill -f 'npm install'")));
        assert!(scripts.iter().any(|s| s.contains("nohup npm run dev")));
    }

    #[tokio::test]
    async fn crashed_installer_ends_with_error() {
        let fake = FakeProvider::with_behavior(Behavior {
            crash_install: true,
            ..Default::default()
        });
        let h = harness_with(fake, test_config());
        h.live_session().await;

        let events = h.install(&["lodash"]).await;

        let last = events.last().unwrap();
        assert_eq!(last.kind, InstallEventKind::Error);
        assert_eq!(last.data.as_ref().unwrap()["reason"], "crash");
        assert!(last.message.contains("connection reset"));
        assert!(!events.iter().any(|e| e.kind == InstallEventKind::Complete));
    }
}

mod rejections {
    use super::*;

    #[tokio::test]
    async fn empty_request_is_invalid_before_session_lookup() {
        let h = harness();

        let err = h
            .installer
            .install(Vec::<String>::new(), None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn shell_metacharacters_are_invalid() {
        let h = harness();
        h.live_session().await;

        let err = h
            .installer
            .install(["lodash; rm -rf /"], None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(h.fake.installs().is_empty());
    }

    #[tokio::test]
    async fn no_session_is_not_found() {
        let h = harness();

        let err = h.installer.install(["lodash"], None).await.unwrap_err();

        assert_eq!(err.code(), "SANDBOX_NOT_FOUND");
    }

    #[tokio::test]
    async fn demo_session_installs_nothing() {
        let h = harness_with(FakeProvider::new(), Config::offline());
        h.live_session().await;

        let events = h.install(&["lodash"]).await;

        assert_eq!(
            kinds(&events),
            vec![
                InstallEventKind::Start,
                InstallEventKind::Warning,
                InstallEventKind::Complete,
            ]
        );
        assert!(events[1].data.as_ref().unwrap()["isDemo"] == true);
    }
}
