use poster_studio::server::spawn_session_sweeper;
use poster_studio::{AppState, Config, DirectoryShare, GeminiClient, ShareTarget};
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env()?;

    if std::env::var_os(&config.credential_var).is_none() {
        tracing::warn!(
            var = %config.credential_var,
            "credential not set; generation requests will fail until it is"
        );
    }

    let generator = Arc::new(GeminiClient::from_config(&config));
    let share_target = config.share_dir.clone().map(|dir| {
        tracing::info!(dir = %dir.display(), "server-side sharing enabled");
        Arc::new(DirectoryShare::new(dir)) as Arc<dyn ShareTarget>
    });

    let state = AppState::with_idle_timeout(generator, share_target, config.session_idle_timeout);
    let sweep_every = (config.session_idle_timeout / 4).max(Duration::from_secs(1));
    spawn_session_sweeper(Arc::clone(&state), sweep_every);
    let app = poster_studio::router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(model = %config.model, "server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
