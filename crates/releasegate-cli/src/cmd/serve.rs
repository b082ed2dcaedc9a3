use anyhow::Context;
use releasegate_core::config::Config;
use std::path::Path;

pub fn run(config_path: &Path, port: u16) -> anyhow::Result<()> {
    let config = Config::from_env_and_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(releasegate_server::serve(config, port))
}
