use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "releasegate.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Environments and apps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    /// Branch whose history is offered for promotion into this environment.
    pub source_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub release_branch: String,
    #[serde(default, skip_serializing)]
    pub hook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Project name on the deployment platform.
    pub project: String,
    /// Release target per environment name.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

fn default_environments() -> BTreeMap<String, EnvironmentConfig> {
    let mut m = BTreeMap::new();
    m.insert(
        "dev".to_string(),
        EnvironmentConfig {
            source_branch: "dev".to_string(),
        },
    );
    m.insert(
        "prod".to_string(),
        EnvironmentConfig {
            source_branch: "main".to_string(),
        },
    );
    m
}

fn default_apps() -> BTreeMap<String, AppConfig> {
    let mut m = BTreeMap::new();
    for app in ["app-a", "app-b"] {
        let mut targets = BTreeMap::new();
        for (env, source) in [("dev", "dev"), ("prod", "main")] {
            targets.insert(
                env.to_string(),
                TargetConfig {
                    release_branch: format!("release/{app}-{source}"),
                    hook_url: None,
                },
            );
        }
        m.insert(
            app.to_string(),
            AppConfig {
                project: app.to_string(),
                targets,
            },
        );
    }
    m
}

// ---------------------------------------------------------------------------
// Upstream credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            owner: None,
            repo: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesConfig {
    #[serde(default = "default_pages_api")]
    pub api_base: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_pages_api() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            api_base: default_pages_api(),
            account_id: None,
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AccessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// JWKS endpoint publishing the assertion signing keys.
    #[serde(default)]
    pub certs_url: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    /// When non-empty, only these identities are admitted (case-insensitive).
    #[serde(default)]
    pub allowed_identities: Vec<String>,
    #[serde(default = "default_assertion_header")]
    pub header: String,
    #[serde(default = "default_assertion_cookie")]
    pub cookie: String,
    #[serde(default = "default_key_ttl")]
    pub key_ttl_secs: u64,
}

fn default_assertion_header() -> String {
    "cf-access-jwt-assertion".to_string()
}

fn default_assertion_cookie() -> String {
    "CF_Authorization".to_string()
}

fn default_key_ttl() -> u64 {
    3600
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            certs_url: None,
            audience: None,
            issuer: None,
            allowed_identities: Vec::new(),
            header: default_assertion_header(),
            cookie: default_assertion_cookie(),
            key_ttl_secs: default_key_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// redb database file. Unset disables the audit log.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_environments")]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    #[serde(default = "default_apps")]
    pub apps: BTreeMap<String, AppConfig>,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub pages: PagesConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environments: default_environments(),
            apps: default_apps(),
            github: GitHubConfig::default(),
            pages: PagesConfig::default(),
            access: AccessConfig::default(),
            cors: CorsConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// A validated (app, env) pair with everything the deploy and status paths need.
#[derive(Debug, Clone, PartialEq)]
pub struct Target<'a> {
    pub app: &'a str,
    pub env: &'a str,
    pub project: &'a str,
    pub source_branch: &'a str,
    pub release_branch: &'a str,
    pub hook_url: Option<&'a str>,
}

impl Config {
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Self::from_yaml(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Overlay secrets from the process environment (or any lookup).
    ///
    /// Recognised names: `GH_OWNER`, `GH_REPO`, `GH_TOKEN`, `CF_ACCOUNT_ID`,
    /// `CF_API_TOKEN`, and `HOOK_<APP>_<ENV>` for each configured target.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, name: &str| {
            if let Some(v) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        };
        set(&mut self.github.owner, "GH_OWNER");
        set(&mut self.github.repo, "GH_REPO");
        set(&mut self.github.token, "GH_TOKEN");
        set(&mut self.pages.account_id, "CF_ACCOUNT_ID");
        set(&mut self.pages.token, "CF_API_TOKEN");

        for (app, cfg) in self.apps.iter_mut() {
            for (env, target) in cfg.targets.iter_mut() {
                set(&mut target.hook_url, &hook_var_name(app, env));
            }
        }
    }

    pub fn from_env_and_file(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|k| std::env::var(k).ok());
        Ok(config)
    }

    /// Resolve an (app, env) pair against the allow-lists.
    pub fn target<'a>(&'a self, app: &'a str, env: &'a str) -> Result<Target<'a>> {
        let app_cfg = self
            .apps
            .get(app)
            .ok_or_else(|| GateError::UnknownApp(app.to_string()))?;
        let env_cfg = self
            .environments
            .get(env)
            .ok_or_else(|| GateError::UnknownEnv(env.to_string()))?;
        let target = app_cfg
            .targets
            .get(env)
            .ok_or_else(|| GateError::UnknownEnv(env.to_string()))?;
        Ok(Target {
            app,
            env,
            project: &app_cfg.project,
            source_branch: &env_cfg.source_branch,
            release_branch: &target.release_branch,
            hook_url: target.hook_url.as_deref().filter(|u| !u.is_empty()),
        })
    }

    pub fn source_branch(&self, env: &str) -> Result<&str> {
        self.environments
            .get(env)
            .map(|e| e.source_branch.as_str())
            .ok_or_else(|| GateError::UnknownEnv(env.to_string()))
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.access.certs_url.as_deref().unwrap_or("").is_empty() {
            push(WarnLevel::Error, "access.certs_url is not set".to_string());
        }
        if self.access.audience.as_deref().unwrap_or("").is_empty() {
            push(WarnLevel::Error, "access.audience is not set".to_string());
        }
        if self.environments.is_empty() {
            push(WarnLevel::Error, "no environments configured".to_string());
        }
        if self.apps.is_empty() {
            push(WarnLevel::Error, "no apps configured".to_string());
        }
        for (app, cfg) in &self.apps {
            for (env, target) in &cfg.targets {
                if !self.environments.contains_key(env) {
                    push(
                        WarnLevel::Error,
                        format!("app '{app}' targets unknown environment '{env}'"),
                    );
                } else if target.hook_url.as_deref().unwrap_or("").is_empty() {
                    push(
                        WarnLevel::Warning,
                        format!(
                            "no deploy hook for {app}/{env} (set {})",
                            hook_var_name(app, env)
                        ),
                    );
                }
            }
        }
        if self.github.owner.is_none() || self.github.repo.is_none() || self.github.token.is_none()
        {
            push(
                WarnLevel::Warning,
                "GH_OWNER / GH_REPO / GH_TOKEN not fully set".to_string(),
            );
        }
        if self.pages.account_id.is_none() || self.pages.token.is_none() {
            push(
                WarnLevel::Warning,
                "CF_ACCOUNT_ID / CF_API_TOKEN not fully set".to_string(),
            );
        }
        if self.cors.allowed_origins.is_empty() {
            push(
                WarnLevel::Warning,
                "cors.allowed_origins is empty; browsers will be denied".to_string(),
            );
        }
        if self.audit.path.is_none() {
            push(
                WarnLevel::Warning,
                "audit.path is not set; deploy history is not recorded".to_string(),
            );
        }
        warnings
    }
}

/// `app-a` + `dev` → `HOOK_APP_A_DEV`.
pub fn hook_var_name(app: &str, env: &str) -> String {
    format!("HOOK_{}_{}", app, env)
        .to_uppercase()
        .replace(['-', '.'], "_")
}
