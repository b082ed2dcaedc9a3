use std::sync::Arc;

use releasegate_core::access::AdmissionControl;
use releasegate_core::audit::AuditLog;
use releasegate_core::config::Config;
use releasegate_core::deploy::Deployer;
use releasegate_core::github::GitHubClient;
use releasegate_core::pages::PagesClient;
use releasegate_core::status::StatusReconciler;

/// Shared, cheaply cloneable server state. The admission key cache lives
/// inside `access` and is shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub access: Arc<AdmissionControl>,
    pub github: GitHubClient,
    pub deployer: Deployer,
    pub status: StatusReconciler,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(
        config: Config,
        access: AdmissionControl,
        audit: AuditLog,
        http: reqwest::Client,
    ) -> Self {
        let config = Arc::new(config);
        let audit = Arc::new(audit);
        let github = GitHubClient::new(http.clone(), config.github.clone());
        let pages = PagesClient::new(http.clone(), config.pages.clone());
        Self {
            deployer: Deployer::new(
                Arc::clone(&config),
                github.clone(),
                http,
                Arc::clone(&audit),
            ),
            status: StatusReconciler::new(Arc::clone(&config), pages),
            access: Arc::new(access),
            github,
            audit,
            config,
        }
    }

    /// Wire everything from a loaded config: one HTTP client, the JWKS-backed
    /// admission check and the configured audit store.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::new();
        let access = AdmissionControl::from_config(http.clone(), &config.access)?;
        let audit = AuditLog::from_config(&config.audit)?;
        Ok(Self::new(config, access, audit, http))
    }
}
