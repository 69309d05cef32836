use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use deskpipe_capture::{EngineFactory, ScreenCapturer, Technology};
use deskpipe_core::{
    FrameFormat, Pipeline, PixelFormatConverterConfig, ScreenCaptureConfig, VideoScalerConfig,
};
use deskpipe_processors::{PixelFormatConverter, VideoScaler};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::recorder::Y4mRecorder;

// ── AppConfig ─────────────────────────────────────────────────────────────────

/// Recorder configuration.
///
/// Loaded from the JSON file named by `DESKPIPE_CONFIG` (all fields
/// optional), then overridden by:
///   - `DESKPIPE_FPS`: capture frame rate
///   - `DESKPIPE_MONITOR`: monitor index
///   - `DESKPIPE_DURATION_SECS`: recording length, `0` = until Ctrl-C
///   - `DESKPIPE_OUTPUT`: output prefix (`<prefix>.y4m`)
///   - `DESKPIPE_TECHNOLOGY`: `auto`, `x11`, `dxgi`, …
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: ScreenCaptureConfig,
    pub scaler: VideoScalerConfig,
    pub converter: PixelFormatConverterConfig,
    #[serde(alias = "outputPrefix")]
    pub output_prefix: String,
    #[serde(alias = "durationSecs")]
    pub duration_secs: u64,
    pub technology: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: ScreenCaptureConfig::default(),
            scaler: VideoScalerConfig { target_width: 1280, target_height: 720, ..Default::default() },
            converter: PixelFormatConverterConfig::default(),
            output_prefix: "deskpipe-capture".into(),
            duration_secs: 10,
            technology: "auto".into(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("DESKPIPE_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DESKPIPE_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("DESKPIPE_FPS") {
            self.capture.frame_rate = v.trim().parse().with_context(|| format!("DESKPIPE_FPS={v}"))?;
        }
        if let Some(v) = lookup("DESKPIPE_MONITOR") {
            self.capture.monitor_index =
                v.trim().parse().with_context(|| format!("DESKPIPE_MONITOR={v}"))?;
        }
        if let Some(v) = lookup("DESKPIPE_DURATION_SECS") {
            self.duration_secs =
                v.trim().parse().with_context(|| format!("DESKPIPE_DURATION_SECS={v}"))?;
        }
        if let Some(v) = lookup("DESKPIPE_OUTPUT") {
            self.output_prefix = v;
        }
        if let Some(v) = lookup("DESKPIPE_TECHNOLOGY") {
            self.technology = v;
        }
        Ok(())
    }

    pub fn technology(&self) -> Result<Technology> {
        self.technology
            .parse()
            .with_context(|| format!("capture technology '{}'", self.technology))
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.y4m", self.output_prefix))
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}

// ── Run ───────────────────────────────────────────────────────────────────────

/// Record the desktop until Ctrl-C or the configured duration elapses.
///
/// # Flow
/// 1. Resolve the capture technology and build the capturer
/// 2. Wire capturer → scaler → converter → recorder and initialize
/// 3. Log the available screens
/// 4. Start, wait, stop, log the summary
pub async fn run(mut config: AppConfig) -> Result<()> {
    config.capture.validate().context("invalid capture configuration")?;
    if config.converter.output_format != FrameFormat::I420 {
        warn!(
            requested = %config.converter.output_format,
            "y4m output needs I420, overriding converter output format"
        );
        config.converter.output_format = FrameFormat::I420;
    }

    let technology = config.technology()?;
    info!(technology = %EngineFactory::technology_name(technology), "capture technology selected");

    let capturer = Arc::new(
        ScreenCapturer::new(config.capture.clone(), technology).context("creating screen capturer")?,
    );
    let scaler = Arc::new(VideoScaler::new(config.scaler.clone()));
    let converter = Arc::new(PixelFormatConverter::new(config.converter.clone()));

    let path = config.output_path();
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let recorder = Arc::new(Y4mRecorder::new(BufWriter::new(file), config.capture.frame_rate));

    let mut pipeline = Pipeline::new();
    pipeline.set_source(Arc::clone(&capturer));
    pipeline.add_processor(Arc::clone(&scaler));
    pipeline.add_processor(Arc::clone(&converter));
    pipeline.set_sink(Arc::clone(&recorder));
    pipeline.link_all().context("linking pipeline")?;
    pipeline.initialize().context("initializing pipeline")?;

    let screens = capturer.available_screens();
    info!("{} screen(s) available", screens.len());
    for screen in &screens {
        info!("  {screen}");
    }

    pipeline.start().context("starting pipeline")?;
    info!(
        output = %path.display(),
        interval_ms = capturer.frame_interval().as_millis() as u64,
        "recording"
    );

    match config.duration() {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("recording duration reached"),
                r = tokio::signal::ctrl_c() => { r.context("waiting for Ctrl-C")?; info!("Ctrl-C received"); }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("Ctrl-C received");
        }
    }

    pipeline.stop();
    if let Some(e) = capturer.last_error() {
        warn!(error = %e, "capture reported an error during the session");
    }

    let scaled = scaler.stats();
    let converted = converter.stats();
    let recorded = recorder.stats();
    info!(
        scaled = scaled.frames_processed,
        scaler_dropped = scaled.frames_dropped,
        avg_scale_us = scaled.avg_scale_time_us,
        converted = converted.frames_converted,
        converter_dropped = converted.frames_dropped,
        "processing summary"
    );
    info!(
        frames = recorded.frames_written,
        bytes = recorded.bytes_written,
        skipped = recorded.frames_skipped,
        output = %path.display(),
        "recording finished"
    );

    pipeline.clear();
    Ok(())
}
