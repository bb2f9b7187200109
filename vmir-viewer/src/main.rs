//! VMIR viewer — entry point.
//!
//! ```text
//! vmir-viewer                     Mirror the default X display
//! vmir-viewer --config <path>     Use custom config TOML
//! vmir-viewer --gen-config        Dump default config and exit
//! vmir-viewer --display :1        Mirror a specific display
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vmir_core::{
    CursorSprite, FocusPicker, MirrorService, SceneRenderer, StatePaths, WindowSystemPort,
    X11Port, drain_frame, scene_channel,
};

use vmir_viewer::backend::HeadlessBackend;
use vmir_viewer::config::ViewerConfig;
use vmir_viewer::input;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vmir-viewer", about = "Mirror desktop windows into a 3-D scene")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vmir-viewer.toml")]
    config: PathBuf,

    /// State directory (overrides config). Holds the mirror lists.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// X display to mirror (overrides $DISPLAY).
    #[arg(long)]
    display: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ViewerConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vmir-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Connect to the window system ─────────────────────────

    // Fatal without it: nothing can be mirrored.
    let port: Arc<dyn WindowSystemPort> = Arc::new(X11Port::connect(cli.display.as_deref())?);
    let cursor = Arc::new(CursorSprite::load(std::path::Path::new(
        &config.state.cursor_sprite,
    )));

    // ── 2. Assemble the pipeline ────────────────────────────────

    let state_dir = cli
        .state_dir
        .unwrap_or_else(|| PathBuf::from(&config.state.dir));
    let state_paths = StatePaths::in_dir(&state_dir);

    let (bridge, mut mailbox) = scene_channel(config.scene.queue_depth);
    let picker = Arc::new(FocusPicker::new(Arc::clone(&port)));
    let (service, control_tx) = MirrorService::new(
        Arc::clone(&port),
        bridge,
        Arc::clone(&picker),
        cursor,
        config.policy(),
        state_paths,
    );
    let token = service.shutdown_token();

    // ── 3. Graphics frame loop ──────────────────────────────────

    let frame_interval = Duration::from_secs_f64(1.0 / config.scene.frame_rate.max(1) as f64);
    let gfx_token = token.clone();
    let gfx_picker = Arc::clone(&picker);
    let gfx = std::thread::Builder::new()
        .name("scene-frame-loop".into())
        .spawn(move || {
            let mut renderer = SceneRenderer::new(HeadlessBackend::new());
            let mut frames: u64 = 0;
            while !gfx_token.is_cancelled() {
                let frame_start = Instant::now();
                drain_frame(&mut mailbox, &mut renderer, &gfx_picker);
                frames += 1;
                if frames % 60 == 0 {
                    tracing::debug!(hud = %gfx_picker.hud_line(), "frame loop alive");
                }
                if let Some(remaining) = frame_interval.checked_sub(frame_start.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
            info!(
                uploads = renderer.backend().uploads(),
                rebuilds = renderer.backend().rebuilds(),
                "frame loop exited"
            );
        })?;

    // ── 4. Run ──────────────────────────────────────────────────

    let service_task = tokio::spawn(service.run());
    let console_task = tokio::spawn(input::run_console(control_tx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt; shutting down");
            token.cancel();
        }
        // The console's "quit" path cancels through the service.
        _ = token.cancelled() => {}
    }

    // ── 5. Shutdown ─────────────────────────────────────────────

    // The service cancels workers and persists placement before
    // returning; only then is the X connection dropped.
    service_task.await??;
    console_task.abort();
    if gfx.join().is_err() {
        warn!("frame loop panicked during shutdown");
    }

    info!("vmir-viewer going down");
    Ok(())
}
