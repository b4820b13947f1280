//! A client connected to an in-process display over a socket pair
//!
//! Both ends live on the test thread; [`Harness::pump`] moves requests and
//! events across until the exchange settles.

use std::fs::File;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use wayland_client::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_registry, wl_shm, wl_shm_pool, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, EventQueue, QueueHandle};
use wayland_server::Display;

use crate::compositor::SurfaceId;
use crate::server::{create_globals, ServerState};

/// What the client has received
#[derive(Debug, Default)]
pub(crate) struct ClientState {
    pub compositor: Option<wl_compositor::WlCompositor>,
    pub shm: Option<wl_shm::WlShm>,
    /// `wl_callback.done` payloads in arrival order
    pub frames_done: Vec<u32>,
    /// Number of `wl_buffer.release` events
    pub released: usize,
}

impl Dispatch<wl_registry::WlRegistry, ()> for ClientState {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            match interface.as_str() {
                "wl_compositor" => {
                    let compositor =
                        registry.bind::<wl_compositor::WlCompositor, _, _>(name, version.min(6), qh, ());
                    state.compositor = Some(compositor);
                }
                "wl_shm" => {
                    state.shm = Some(registry.bind::<wl_shm::WlShm, _, _>(name, version.min(1), qh, ()));
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ()> for ClientState {
    fn event(
        state: &mut Self,
        _callback: &wl_callback::WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { callback_data } = event {
            state.frames_done.push(callback_data);
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ()> for ClientState {
    fn event(
        state: &mut Self,
        _buffer: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.released += 1;
        }
    }
}

delegate_noop!(ClientState: wl_compositor::WlCompositor);
delegate_noop!(ClientState: wl_shm_pool::WlShmPool);
delegate_noop!(ClientState: ignore wl_shm::WlShm);
delegate_noop!(ClientState: ignore wl_surface::WlSurface);

/// A display with one connected client
pub(crate) struct Harness {
    display: Display<ServerState>,
    pub state: ServerState,
    pub conn: Connection,
    queue: EventQueue<ClientState>,
    pub client: ClientState,
}

impl Harness {
    /// Connect a client to a display serving `state` and bind the globals
    pub fn new(state: ServerState) -> Self {
        let display = Display::<ServerState>::new().unwrap();
        let mut dh = display.handle();
        create_globals(&dh);

        let (server_end, client_end) = UnixStream::pair().unwrap();
        dh.insert_client(server_end, Arc::new(())).unwrap();

        let conn = Connection::from_socket(client_end).unwrap();
        let queue = conn.new_event_queue();
        conn.display().get_registry(&queue.handle(), ());

        let mut harness = Self {
            display,
            state,
            conn,
            queue,
            client: ClientState::default(),
        };
        harness.pump();
        assert!(harness.client.compositor.is_some());
        assert!(harness.client.shm.is_some());
        harness
    }

    pub fn qh(&self) -> QueueHandle<ClientState> {
        self.queue.handle()
    }

    /// Deliver everything the client sent and everything the server answered.
    ///
    /// Errors after a disconnect are expected and left for
    /// [`Connection::protocol_error`] to report.
    pub fn pump(&mut self) {
        for _ in 0..4 {
            let _ = self.conn.flush();
            self.display.dispatch_clients(&mut self.state).unwrap();
            self.display.flush_clients().unwrap();
            if let Some(guard) = self.queue.prepare_read() {
                let _ = guard.read();
            }
            let _ = self.queue.dispatch_pending(&mut self.client);
        }
    }

    /// Create a surface, returning the client object and the server-side id
    pub fn create_surface(&mut self) -> (wl_surface::WlSurface, SurfaceId) {
        let qh = self.qh();
        let compositor = self.client.compositor.clone().unwrap();
        let surface = compositor.create_surface(&qh, ());
        self.pump();

        let id = self
            .state
            .compositor
            .surfaces
            .iter()
            .map(|(id, _)| *id)
            .max_by_key(|id| id.0)
            .unwrap();
        (surface, id)
    }

    /// Create an XRGB8888 shm buffer. The pool is backed by `/dev/null`; the
    /// compositor never reads pixels.
    pub fn create_buffer(&mut self, width: i32, height: i32) -> wl_buffer::WlBuffer {
        let qh = self.qh();
        let file = File::open("/dev/null").unwrap();
        let stride = width * 4;

        let shm = self.client.shm.clone().unwrap();
        let pool = shm.create_pool(file.as_fd(), stride * height, &qh, ());
        let buffer = pool.create_buffer(0, width, height, stride, wl_shm::Format::Xrgb8888, &qh, ());
        pool.destroy();
        self.pump();
        buffer
    }
}
