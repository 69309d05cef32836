//! deskpipe-record — capture the desktop and write it to a Y4M file.
//!
//! ```text
//! ScreenCapturer ─► VideoScaler ─► PixelFormatConverter (I420) ─► Y4mRecorder
//! ```
//!
//! Configuration comes from the JSON file named by `DESKPIPE_CONFIG` plus the
//! `DESKPIPE_*` overrides documented on [`app::AppConfig`].

mod app;
mod recorder;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("deskpipe-record v{}", env!("CARGO_PKG_VERSION"));

    let config = app::AppConfig::load()?;
    app::run(config).await
}
