use std::future::IntoFuture;

use repo_og_image::{AppConfig, AppState, ShutdownManager, build_router};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format.eq_ignore_ascii_case("compact") {
        builder.compact().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    // 日志尚未初始化，配置错误直接写 stderr
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config init failed: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let app_state = match AppState::from_config(&config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("应用初始化失败: {}", e);
            std::process::exit(1);
        }
    };
    if config.github.bearer_token().is_none() {
        tracing::info!("未配置 GitHub token，以匿名身份访问 API（速率限制较低）");
    }

    let app = build_router(app_state);

    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("OG image: http://{}/{{owner}}/{{repo}}", addr);

    let shutdown_timeout = config.shutdown.timeout_duration();
    let signal_manager = shutdown_manager.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = signal_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅退出...", reason);
    });

    // 收到信号后，在途请求最多再等待 shutdown_timeout
    let drain_deadline = async {
        shutdown_manager.wait_for_shutdown().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        res = server.into_future() => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
            tracing::info!("优雅退出完成");
        }
        _ = drain_deadline => {
            tracing::warn!("优雅退出超时（{}秒），强制退出", config.shutdown.timeout_secs);
        }
    }
}
