use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid app '{0}'")]
    UnknownApp(String),

    #[error("invalid env '{0}'")]
    UnknownEnv(String),

    #[error("invalid commit SHA '{0}': expected 7-40 hex characters")]
    InvalidCommitFormat(String),

    #[error("commit not found or not accessible: {0}")]
    CommitNotFound(String),

    #[error("failed to move {branch}: {message}")]
    PointerUpdate { branch: String, message: String },

    #[error("deploy hook call failed: {0}")]
    Hook(String),

    #[error("deploy hook call failed (HTTP {status})")]
    HookStatus {
        status: u16,
        app: String,
        env: String,
        release_branch: String,
        commit: String,
    },

    #[error("missing deploy hook URL for {app}/{env}")]
    MissingHookUrl { app: String, env: String },

    #[error("missing {0} in configuration")]
    MissingCredentials(&'static str),

    #[error("{0}")]
    Upstream(String),

    #[error("audit store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
