//! End-to-end pairing journeys.
//!
//! Drives the public API the way the HTTP layer does: create a session,
//! feed protocol events through the simulated client, poll status, fetch
//! the credential artifact, and let the sweeper expire abandoned sessions.
//!
//! Run: `cargo test --test pairing_journey`

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use pairgate::error::SessionError;
use pairgate::link::{ConnectionState, LinkEvent, SimulatedLinkClient};
use pairgate::pairing::{
    ARTIFACT_FILE_NAME, CodeAllocator, PairingService, SessionStatus, SessionStore,
    SweeperConfig,
};

const TTL: Duration = Duration::from_secs(60);
const POLL_ATTEMPTS: usize = 400;
const POLL_DELAY: Duration = Duration::from_millis(5);

struct Harness {
    dir: TempDir,
    client: SimulatedLinkClient,
    service: PairingService,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let client = SimulatedLinkClient::new();
        let service = PairingService::new(
            SessionStore::new(dir.path(), CodeAllocator::default()),
            Arc::new(client.clone()),
            SweeperConfig {
                ttl: TTL,
                interval: Duration::from_secs(3600),
                enabled: true,
            },
        );
        Self {
            dir,
            client,
            service,
        }
    }

    /// Create a session and wait until its link connection is live.
    async fn connected_session(&self) -> String {
        let code = self.service.create_session().await.unwrap().code;
        for _ in 0..POLL_ATTEMPTS {
            if self.client.is_connected(&code) {
                break;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        assert!(self.client.is_connected(&code), "link never connected");
        self.wait_for(&code, SessionStatus::Connecting).await;
        code
    }

    async fn send(&self, code: &str, event: LinkEvent) {
        assert!(
            self.client.inject(code, event).await,
            "no live link for {}",
            code
        );
    }

    async fn wait_for(&self, code: &str, status: SessionStatus) {
        for _ in 0..POLL_ATTEMPTS {
            if self.service.get_session(code).await.map(|s| s.status) == Some(status) {
                return;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        panic!("session {} never reached {}", code, status);
    }

    async fn wait_for_payload(&self, code: &str, payload: &str) {
        for _ in 0..POLL_ATTEMPTS {
            let current = self
                .service
                .get_session(code)
                .await
                .and_then(|s| s.scannable_payload);
            if current.as_deref() == Some(payload) {
                return;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        panic!("session {} never showed payload {}", code, payload);
    }

    async fn wait_for_artifact(&self, code: &str) {
        for _ in 0..POLL_ATTEMPTS {
            if self.service.artifact_path(code).await.is_some() {
                return;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        panic!("artifact for {} never appeared", code);
    }
}

mod scenario_a_fresh_session {
    use super::*;

    #[tokio::test]
    async fn test_new_session_is_created_or_connecting_without_artifact() {
        let h = Harness::new();
        let ticket = h.service.create_session().await.unwrap();

        let view = h.service.session_status(&ticket.code).await.unwrap();
        assert!(matches!(
            view.status,
            SessionStatus::Created | SessionStatus::Connecting
        ));
        assert!(!view.has_qr);
        assert!(!view.artifact_ready);
        assert!(h.service.artifact_path(&ticket.code).await.is_none());
    }
}

mod scenario_b_numeric_code {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_qr_then_pairing_code_reports_code_status() {
        let h = Harness::new();
        let code = h.connected_session().await;

        h.send(&code, LinkEvent::qr("2@ref,key,adv")).await;
        h.wait_for(&code, SessionStatus::Qr).await;

        h.send(&code, LinkEvent::PairingCode("WXYZ-1234".to_string()))
            .await;
        h.wait_for(&code, SessionStatus::Code).await;

        let view = h.service.session_status(&code).await.unwrap();
        assert!(view.has_qr);
        assert_eq!(view.qr.as_deref(), Some("2@ref,key,adv"));
        assert_eq!(view.pairing_code.as_deref(), Some("WXYZ-1234"));
    }

    #[tokio::test]
    async fn test_late_qr_keeps_code_status() {
        let h = Harness::new();
        let code = h.connected_session().await;

        h.send(&code, LinkEvent::PairingCode("WXYZ-1234".to_string()))
            .await;
        h.send(&code, LinkEvent::qr("refreshed")).await;
        h.wait_for_payload(&code, "refreshed").await;

        assert_eq!(
            h.service.get_session(&code).await.unwrap().status,
            SessionStatus::Code
        );
    }
}

mod scenario_c_open_materializes_artifact {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_open_merges_existing_credential_files() {
        let h = Harness::new();
        let code = h.connected_session().await;
        let working_dir = h.dir.path().join(&code);
        std::fs::write(working_dir.join("creds.json"), r#"{"me":null}"#).unwrap();
        std::fs::write(working_dir.join("app-state.json"), r#"{"v":1}"#).unwrap();

        h.send(&code, LinkEvent::qr("payload")).await;
        h.send(&code, LinkEvent::connection(ConnectionState::Open))
            .await;
        h.wait_for(&code, SessionStatus::Open).await;
        h.wait_for_artifact(&code).await;

        let document = h.service.fetch_artifact(&code).await.unwrap();
        let names: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["app-state.json", "creds.json"]);
        assert_eq!(document["app-state.json"], r#"{"v":1}"#);
        assert!(working_dir.join(ARTIFACT_FILE_NAME).is_file());
    }

    #[tokio::test]
    async fn test_duplicate_open_keeps_artifact_stable() {
        let h = Harness::new();
        let code = h.connected_session().await;

        h.send(&code, LinkEvent::connection(ConnectionState::Open))
            .await;
        h.wait_for_artifact(&code).await;
        let path = h.service.artifact_path(&code).await.unwrap();
        let first = std::fs::read(&path).unwrap();

        h.send(&code, LinkEvent::connection(ConnectionState::Open))
            .await;
        h.send(&code, LinkEvent::CredentialsUpdated).await;
        // The stream is processed in order; once this payload lands, the
        // second open has been handled.
        h.send(&code, LinkEvent::qr("marker")).await;
        h.wait_for_payload(&code, "marker").await;

        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            h.service.get_session(&code).await.unwrap().status,
            SessionStatus::Open
        );
    }
}

mod scenario_d_expiry {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unpaired_session_is_evicted_after_ttl() {
        let h = Harness::new();
        let code = h.connected_session().await;
        let working_dir = h.dir.path().join(&code);
        assert!(working_dir.is_dir());

        let later = Utc::now() + chrono::Duration::from_std(TTL).unwrap()
            + chrono::Duration::seconds(1);
        let result = h.service.sweeper().sweep_at(later).await;

        assert_eq!(result.evicted, 1);
        assert!(h.service.get_session(&code).await.is_none());
        assert!(!working_dir.exists());
        // Either the sweeper or the controller (if the link attached after
        // eviction) terminates the connection.
        for _ in 0..POLL_ATTEMPTS {
            if h.client.was_terminated(&code) {
                break;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        assert!(h.client.was_terminated(&code));
        assert!(matches!(
            h.service.fetch_artifact(&code).await,
            Err(SessionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_startup_is_also_evicted() {
        let dir = TempDir::new().unwrap();
        let service = PairingService::new(
            SessionStore::new(dir.path(), CodeAllocator::default()),
            Arc::new(SimulatedLinkClient::new().with_startup_failure("version fetch failed")),
            SweeperConfig {
                ttl: TTL,
                interval: Duration::from_secs(3600),
                enabled: true,
            },
        );
        let code = service.create_session().await.unwrap().code;
        for _ in 0..POLL_ATTEMPTS {
            if service.get_session(&code).await.map(|s| s.status) == Some(SessionStatus::Error) {
                break;
            }
            tokio::time::sleep(POLL_DELAY).await;
        }
        let view = service.session_status(&code).await.unwrap();
        assert_eq!(view.status, SessionStatus::Error);
        assert!(view.error.unwrap().contains("version fetch failed"));

        let later = Utc::now() + chrono::Duration::hours(1);
        service.sweeper().sweep_at(later).await;
        assert!(service.get_session(&code).await.is_none());
    }
}

mod scenario_e_open_retention {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_open_session_survives_sweeps() {
        let h = Harness::new();
        let code = h.connected_session().await;

        h.send(&code, LinkEvent::connection(ConnectionState::Open))
            .await;
        h.wait_for(&code, SessionStatus::Open).await;
        h.wait_for_artifact(&code).await;

        let much_later = Utc::now() + chrono::Duration::days(90);
        let result = h.service.sweeper().sweep_at(much_later).await;

        assert_eq!(result.evicted, 0);
        assert!(h.service.get_session(&code).await.is_some());
        assert!(h.service.fetch_artifact(&code).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_after_pairing_is_evicted_after_ttl() {
        let h = Harness::new();
        let code = h.connected_session().await;
        let working_dir = h.dir.path().join(&code);

        h.send(&code, LinkEvent::connection(ConnectionState::Open))
            .await;
        h.send(&code, LinkEvent::connection(ConnectionState::Close))
            .await;
        h.wait_for(&code, SessionStatus::Closed).await;
        assert!(h.service.get_session(&code).await.unwrap().paired_at.is_some());

        let later = Utc::now() + chrono::Duration::days(1);
        let result = h.service.sweeper().sweep_at(later).await;

        assert_eq!(result.evicted, 1);
        assert!(h.service.get_session(&code).await.is_none());
        assert!(!working_dir.exists());
    }
}
