use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use guess_the_weight::config::AppConfig;
use guess_the_weight::engine::Aggregator;
use guess_the_weight::gateway::{serve, AppState};

#[derive(Debug, Parser)]
#[command(name = "guess-the-weight", about = "Guess aggregation and rolling-window stats service")]
struct Cli {
    /// TOML 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// 覆盖监听地址
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 1. 配置：文件 (可缺省) -> 环境变量 -> 命令行
    let missing_config = !Path::new(&cli.config).exists();
    let mut config = if missing_config {
        AppConfig::default()
    } else {
        AppConfig::load(&cli.config)?
    };
    config = config.apply_env()?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    config.validate()?;

    // 2. 日志：RUST_LOG 优先于配置
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 [Main] Starting guess aggregation service...");
    if missing_config {
        warn!("⚠️ [Main] Config file {} not found, using defaults", cli.config);
    }
    info!(
        backend = ?config.store.backend,
        keep_n = config.window.keep_n,
        "⚙️ [Main] Store configured"
    );

    // 3. 存储句柄懒加载，第一个请求才真正打开
    let aggregator = Aggregator::from_config(&config);
    let state = AppState::new(aggregator);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    match serve(listener, state, request_timeout).await {
        Ok(()) => info!("👋 [Main] Shutdown complete."),
        Err(e) => {
            error!("❌ [Main] Server crashed: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}
