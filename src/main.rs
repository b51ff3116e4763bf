use std::sync::Arc;

use clap::Parser;
use splinter::auth::TokenAuthenticator;
use splinter::config::{Cli, Config, default_config_dir, default_config_path};
use splinter::handler::{AppState, app};
use splinter::highlighter::{Dispatcher, PygmentsRenderer};
use splinter::service::Splinter;
use splinter::storage::Backend;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // --config also decides where the database lives: next to the config file
    let (config_path, data_dir) = match &args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("splinter.svc starting");

    let mut cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    if let Err(e) = cfg.apply_cli(&args) {
        tracing::error!(error = %e, "invalid command line override");
        std::process::exit(1);
    }

    let store = Arc::new(Backend::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup storage");
        std::process::exit(1);
    }));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        PygmentsRenderer::new(cfg.highlighter.command.clone()),
        cfg.highlighter.dispatcher_options(),
    ));
    let auth = TokenAuthenticator::new(
        &cfg.auth.secret,
        chrono::Duration::minutes(cfg.auth.token_ttl_minutes),
    )
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup token authenticator");
        std::process::exit(1);
    });
    let service = Arc::new(Splinter::new(store, dispatcher.clone(), auth));

    let cancellation_token = CancellationToken::new();
    let workers = dispatcher.spawn_workers(cfg.highlighter.workers, &cancellation_token);
    tracing::info!(
        workers = cfg.highlighter.workers,
        queue_size = cfg.highlighter.queue_size,
        "highlight workers running"
    );

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("splinter.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app(AppState { service })) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server stopped");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
    }

    cancellation_token.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "highlight worker did not stop cleanly");
        }
    }

    let stats = dispatcher.stats();
    tracing::info!(
        rendered = stats.rendered,
        failed = stats.failed,
        rejected = stats.rejected,
        dropped = stats.pending,
        "splinter.svc going off, graceful shutdown complete"
    );
}
