//! wlkms - drive a KMS output and serve Wayland clients
//!
//! Binds the Wayland socket, brings up the DRM backend and requests a page
//! flip every refresh interval from a calloop timer.

use std::time::Instant;

use anyhow::Context;
use calloop::timer::{TimeoutAction, Timer};
use log::{debug, error, info, warn};
use wayland_server::DisplayHandle;

use wlkms::backend::{DrmBackend, DrmEventTarget, EventLoop, GbmPlatform};
use wlkms::config::Config;
use wlkms::server::{ServerState, WaylandServer};

/// Loop state shared by every event source
struct App {
    state: ServerState,
    display: DisplayHandle,
    backend: Option<DrmBackend<GbmPlatform>>,
    started: Instant,
}

impl AsMut<ServerState> for App {
    fn as_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }
}

impl DrmEventTarget<GbmPlatform> for App {
    fn drm_backend(&mut self) -> Option<&mut DrmBackend<GbmPlatform>> {
        self.backend.as_mut()
    }
}

impl App {
    /// One refresh tick: queue a flip and let clients draw the next frame
    fn on_refresh(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.request_flip() {
                if e.is_transient() {
                    debug!("Skipping frame: {}", e);
                } else {
                    warn!("Flip failed: {}", e);
                }
            }
        }

        let time_ms = self.started.elapsed().as_millis() as u32;
        if self.state.compositor.frame_done(time_ms) > 0 {
            if let Err(e) = self.display.flush_clients() {
                warn!("Failed to flush clients: {}", e);
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env();
    info!("Starting wlkms on {}", config.device.display());

    let mut event_loop = EventLoop::<App>::new()?;
    let handle = event_loop.handle();

    let mut server = WaylandServer::new()?;
    server.register_globals();
    std::env::set_var("WAYLAND_DISPLAY", server.socket_name());

    let mut app = App {
        state: ServerState::default(),
        display: server.display_handle(),
        backend: None,
        started: Instant::now(),
    };

    let backend = DrmBackend::open(&config, &handle, &mut app.state.compositor.output)
        .context("Failed to initialize drm backend")?;
    app.backend = Some(backend);

    server.insert_into_loop(&handle)?;

    let refresh = config.refresh;
    handle
        .insert_source(Timer::from_duration(refresh), move |_, _, app: &mut App| {
            app.on_refresh();
            TimeoutAction::ToDuration(refresh)
        })
        .map_err(|e| e.error)?;

    let result = event_loop.run(&mut app);

    app.state.compositor.destroy_all();
    if let Some(backend) = app.backend.take() {
        backend.shutdown();
    }
    result
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    run().inspect_err(|e| error!("{:#}", e))
}
