mod cli;
mod common;
mod http_client;
mod model;
mod runner;
mod service;
mod sink;
mod twitter;

use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;

use cli::Cli;
use model::config::Config;
use runner::Outcome;
use service::Unit;

/// 凭据环境变量，依次尝试
const BEARER_TOKEN_VARS: &[&str] = &["Bearer_Token", "BEARER_TOKEN"];

fn load_bearer_token() -> anyhow::Result<String> {
    BEARER_TOKEN_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| anyhow::anyhow!("环境变量中未找到 Bearer Token（{}）", BEARER_TOKEN_VARS.join(" / ")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    let plan = cli.apply(&mut config);
    config.validate()?;

    if plan.persist {
        config.save()?;
        if let Some(path) = config.config_path() {
            tracing::info!("配置已写入 {}", path.display());
        }
    }
    if !plan.execute {
        return Ok(());
    }
    if !plan.run_stream && !plan.run_user {
        tracing::warn!("配置中没有启用任何服务");
        return Ok(());
    }

    // .env 不存在时忽略
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("未加载 .env: {}", e);
    }
    let bearer_token: Arc<str> = load_bearer_token()?.into();

    let config = Arc::new(config);
    let selected = [(plan.run_stream, Unit::Stream), (plan.run_user, Unit::User)];
    let units: Vec<(&'static str, JoinHandle<Outcome>)> = selected
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, unit)| (unit.name(), tokio::spawn(unit.run(config.clone(), bearer_token.clone()))))
        .collect();

    let mut failed = Vec::new();
    for (name, handle) in units {
        match handle.await {
            Ok(outcome) if outcome.is_fatal() => {
                tracing::error!(unit = name, ?outcome, "运行单元失败");
                failed.push(name);
            }
            Ok(outcome) => tracing::info!(unit = name, ?outcome, "运行单元结束"),
            Err(e) => {
                tracing::error!(unit = name, "运行单元异常退出: {}", e);
                failed.push(name);
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("以下运行单元失败: {}", failed.join(", "));
    }
    Ok(())
}
