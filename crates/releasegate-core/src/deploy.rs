//! Promote a commit: resolve it, force-move the release branch, fire the
//! deploy hook, record the event.
//!
//! The branch move is not rolled back when the hook fails. The caller sees a
//! failure while the release branch already points at the new commit; the
//! next successful deploy (or a manual hook call) reconciles it.

use std::sync::Arc;

use serde::Deserialize;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::{GateError, Result};
use crate::github::GitHubClient;
use crate::types::{validate_commit_ref, DeployEvent, DeployOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct DeployRequest {
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub commit: String,
}

#[derive(Clone)]
pub struct Deployer {
    config: Arc<Config>,
    github: GitHubClient,
    http: reqwest::Client,
    audit: Arc<AuditLog>,
}

impl Deployer {
    pub fn new(
        config: Arc<Config>,
        github: GitHubClient,
        http: reqwest::Client,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            config,
            github,
            http,
            audit,
        }
    }

    pub async fn deploy(&self, req: &DeployRequest, actor: Option<&str>) -> Result<DeployOutcome> {
        let target = self.config.target(&req.app, &req.env)?;
        let commit_ref = validate_commit_ref(&req.commit)?;
        let hook_url = target.hook_url.ok_or_else(|| GateError::MissingHookUrl {
            app: target.app.to_string(),
            env: target.env.to_string(),
        })?;

        let commit = self.github.resolve_commit(commit_ref).await?;
        self.github
            .update_branch_ref(target.release_branch, &commit.sha)
            .await?;
        tracing::info!(
            "moved {} to {} for {}/{}",
            target.release_branch,
            commit.sha,
            target.app,
            target.env
        );

        let hook_status = self.trigger_hook(hook_url).await?;
        if !(200..300).contains(&hook_status) {
            tracing::warn!(
                "deploy hook for {}/{} returned HTTP {hook_status}; {} already points at {}",
                target.app,
                target.env,
                target.release_branch,
                commit.sha
            );
            return Err(GateError::HookStatus {
                status: hook_status,
                app: target.app.to_string(),
                env: target.env.to_string(),
                release_branch: target.release_branch.to_string(),
                commit: commit.sha,
            });
        }

        let event = DeployEvent::deploy(
            target.app,
            target.env,
            &commit,
            actor,
            hook_status,
            target.release_branch,
        );
        self.record(event).await;

        Ok(DeployOutcome {
            app: target.app.to_string(),
            env: target.env.to_string(),
            source_branch: target.source_branch.to_string(),
            release_branch: target.release_branch.to_string(),
            commit: commit.sha,
            message: commit.message,
            hook_status,
        })
    }

    /// POST an empty trigger request. Any response status is returned; only
    /// transport failures are errors here.
    async fn trigger_hook(&self, url: &str) -> Result<u16> {
        let res = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| GateError::Hook(e.to_string()))?;
        Ok(res.status().as_u16())
    }

    /// Best-effort: the hook already fired, so a store failure is logged
    /// rather than reported as a failed deploy.
    async fn record(&self, event: DeployEvent) {
        let audit = Arc::clone(&self.audit);
        match tokio::task::spawn_blocking(move || audit.append(&event)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("failed to record deploy event: {e}"),
            Err(e) => tracing::warn!("audit task join error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{HistoryQuery, MemoryStore};
    use crate::config::GitHubConfig;
    use mockito::{Matcher, Server, ServerGuard};

    const FULL_SHA: &str = "abc1234000000000000000000000000000000def";

    struct Fixture {
        github: ServerGuard,
        hooks: ServerGuard,
        deployer: Deployer,
        audit: Arc<AuditLog>,
    }

    async fn fixture() -> Fixture {
        fixture_with_hook(None).await
    }

    /// `hook_override` replaces the stub hook URL for app-a/dev.
    async fn fixture_with_hook(hook_override: Option<&str>) -> Fixture {
        let github = Server::new_async().await;
        let hooks = Server::new_async().await;

        let mut config = Config::default();
        config.github = GitHubConfig {
            api_base: github.url(),
            owner: Some("acme".into()),
            repo: Some("site".into()),
            token: Some("ghp".into()),
        };
        let hook_url = hook_override
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/hook/app-a-dev", hooks.url()));
        config.apply_env(|k| (k == "HOOK_APP_A_DEV").then(|| hook_url.clone()));

        let http = reqwest::Client::new();
        let audit = Arc::new(AuditLog::new(MemoryStore::new()));
        let deployer = Deployer::new(
            Arc::new(config.clone()),
            GitHubClient::new(http.clone(), config.github.clone()),
            http,
            Arc::clone(&audit),
        );
        Fixture {
            github,
            hooks,
            deployer,
            audit,
        }
    }

    fn request(app: &str, env: &str, commit: &str) -> DeployRequest {
        DeployRequest {
            app: app.into(),
            env: env.into(),
            commit: commit.into(),
        }
    }

    async fn mock_resolve(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/repos/acme/site/commits/abc1234")
            .with_status(200)
            .with_body(
                serde_json::json!({"sha": FULL_SHA, "commit": {"message": "Fix bug"}})
                    .to_string(),
            )
            .create_async()
            .await
    }

    async fn mock_ref_update(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("PATCH", "/repos/acme/site/git/refs/heads/release/app-a-dev")
            .match_body(Matcher::Json(
                serde_json::json!({"sha": FULL_SHA, "force": true}),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await
    }

    #[tokio::test]
    async fn successful_deploy_moves_pointer_fires_hook_and_records() {
        let mut f = fixture().await;
        mock_resolve(&mut f.github).await;
        let pointer = mock_ref_update(&mut f.github).await;
        let hook = f
            .hooks
            .mock("POST", "/hook/app-a-dev")
            .with_status(200)
            .with_body(r#"{"id":"build-1"}"#)
            .create_async()
            .await;

        let out = f
            .deployer
            .deploy(&request("app-a", "dev", "abc1234"), Some("ops@example.com"))
            .await
            .unwrap();

        pointer.assert_async().await;
        hook.assert_async().await;
        assert_eq!(out.commit, FULL_SHA);
        assert_eq!(out.message, "Fix bug");
        assert_eq!(out.release_branch, "release/app-a-dev");
        assert_eq!(out.source_branch, "dev");
        assert_eq!(out.hook_status, 200);

        let events = f.audit.list(&HistoryQuery::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].commit_sha, FULL_SHA);
        assert_eq!(events[0].actor.as_deref(), Some("ops@example.com"));
        assert!(events[0].result.hook_ok);
    }

    #[tokio::test]
    async fn hook_failure_keeps_pointer_and_skips_audit() {
        let mut f = fixture().await;
        mock_resolve(&mut f.github).await;
        let pointer = mock_ref_update(&mut f.github).await;
        f.hooks
            .mock("POST", "/hook/app-a-dev")
            .with_status(500)
            .create_async()
            .await;

        let err = f
            .deployer
            .deploy(&request("app-a", "dev", "abc1234"), None)
            .await
            .unwrap_err();

        pointer.assert_async().await;
        assert!(err.to_string().contains("HTTP 500"), "{err}");
        match err {
            GateError::HookStatus {
                status,
                release_branch,
                commit,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(release_branch, "release/app-a-dev");
                assert_eq!(commit, FULL_SHA);
            }
            other => panic!("expected HookStatus, got {other:?}"),
        }
        assert!(f.audit.list(&HistoryQuery::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_commit_never_touches_pointer() {
        let mut f = fixture().await;
        f.github
            .mock("GET", "/repos/acme/site/commits/abc1234")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        let pointer = f
            .github
            .mock("PATCH", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let hook = f
            .hooks
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = f
            .deployer
            .deploy(&request("app-a", "dev", "abc1234"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::CommitNotFound(_)));
        pointer.assert_async().await;
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn validation_happens_before_any_call() {
        let mut f = fixture().await;
        let resolve = f
            .github
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let pointer = f
            .github
            .mock("PATCH", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let cases = [
            (request("app-z", "dev", "abc1234"), "UnknownApp"),
            (request("app-a", "qa", "abc1234"), "UnknownEnv"),
            (request("app-a", "dev", "abc123"), "InvalidCommitFormat"),
            (request("app-a", "dev", &"a".repeat(41)), "InvalidCommitFormat"),
            (request("app-a", "dev", "abc123z"), "InvalidCommitFormat"),
            (request("app-a", "prod", "abc1234"), "MissingHookUrl"),
        ];
        for (req, expected) in cases {
            let err = f.deployer.deploy(&req, None).await.unwrap_err();
            assert!(
                format!("{err:?}").starts_with(expected),
                "expected {expected}, got {err:?}"
            );
        }
        resolve.assert_async().await;
        pointer.assert_async().await;
    }

    #[tokio::test]
    async fn repeated_deploys_each_append_an_event() {
        let mut f = fixture().await;
        f.github
            .mock("GET", "/repos/acme/site/commits/abc1234")
            .with_status(200)
            .with_body(serde_json::json!({"sha": FULL_SHA, "commit": {"message": "Fix bug"}}).to_string())
            .expect(2)
            .create_async()
            .await;
        f.github
            .mock("PATCH", "/repos/acme/site/git/refs/heads/release/app-a-dev")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;
        f.hooks
            .mock("POST", "/hook/app-a-dev")
            .with_status(201)
            .expect(2)
            .create_async()
            .await;

        for _ in 0..2 {
            f.deployer
                .deploy(&request("app-a", "dev", "abc1234"), None)
                .await
                .unwrap();
        }
        let events = f.audit.list(&HistoryQuery::default()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.commit_sha == FULL_SHA));
    }

    #[tokio::test]
    async fn pointer_update_failure_skips_hook_and_audit() {
        let mut f = fixture().await;
        mock_resolve(&mut f.github).await;
        f.github
            .mock("PATCH", "/repos/acme/site/git/refs/heads/release/app-a-dev")
            .with_status(422)
            .with_body(r#"{"message":"Reference does not exist"}"#)
            .create_async()
            .await;
        let hook = f
            .hooks
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let err = f
            .deployer
            .deploy(&request("app-a", "dev", "abc1234"), None)
            .await
            .unwrap_err();
        match err {
            GateError::PointerUpdate { branch, message } => {
                assert_eq!(branch, "release/app-a-dev");
                assert_eq!(message, "Reference does not exist");
            }
            other => panic!("expected PointerUpdate, got {other:?}"),
        }
        hook.assert_async().await;
        assert!(f.audit.list(&HistoryQuery::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn hook_transport_failure_is_hook_error() {
        // Nothing listens on port 1.
        let mut f = fixture_with_hook(Some("http://127.0.0.1:1/hook")).await;
        mock_resolve(&mut f.github).await;
        let pointer = mock_ref_update(&mut f.github).await;

        let err = f
            .deployer
            .deploy(&request("app-a", "dev", "abc1234"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Hook(_)), "{err:?}");
        pointer.assert_async().await;
        assert!(f.audit.list(&HistoryQuery::default()).unwrap().is_empty());
    }
}
