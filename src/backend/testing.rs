//! In-memory stand-ins for the card, allocation device and platform

use std::cell::{Cell, RefCell};
use std::io::{self, ErrorKind, Read, Write};
use std::ops::Deref;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::rc::Rc;

use crate::backend::device::{
    BoDescriptor, CardResources, Connector, ConnectorId, Crtc, CrtcId, DisplayDevice, Encoder,
    EncoderId, FramebufferId, ModeSetting, Platform, ResolutionListener, ScanoutSurface,
};
use crate::backend::error::{BackendError, KmsError};

/// Shared record of teardown order
pub type DropLog = Rc<RefCell<Vec<&'static str>>>;

pub struct MockCardState {
    stream: UnixStream,
    peer: UnixStream,
    pub connectors: RefCell<Vec<Connector>>,
    pub encoders: RefCell<Vec<Encoder>>,
    pub crtcs: RefCell<Vec<Crtc>>,
    pub fail_resources: Cell<bool>,
    pub fail_add_fb: Cell<bool>,
    pub fail_page_flip: Cell<bool>,
    pub live_fbs: RefCell<Vec<FramebufferId>>,
    pub flips: RefCell<Vec<(CrtcId, FramebufferId)>>,
    next_fb: Cell<u32>,
    in_flight: Cell<u32>,
    completed: Cell<u32>,
    pub waits: Cell<u32>,
}

/// A card whose kernel side is simulated
///
/// Flips stay in flight until [`MockCard::complete_flip`] is called or the
/// card is waited on, which completes the oldest one.
pub struct MockCard {
    state: Rc<MockCardState>,
    drop_log: Option<DropLog>,
}

impl MockCard {
    pub fn new() -> Self {
        let (stream, peer) = UnixStream::pair().unwrap();
        stream.set_nonblocking(true).unwrap();
        Self {
            state: Rc::new(MockCardState {
                stream,
                peer,
                connectors: RefCell::default(),
                encoders: RefCell::default(),
                crtcs: RefCell::default(),
                fail_resources: Cell::new(false),
                fail_add_fb: Cell::new(false),
                fail_page_flip: Cell::new(false),
                live_fbs: RefCell::default(),
                flips: RefCell::default(),
                next_fb: Cell::new(100),
                in_flight: Cell::new(0),
                completed: Cell::new(0),
                waits: Cell::new(0),
            }),
            drop_log: None,
        }
    }

    /// Another view of the same simulated card
    pub fn handle(&self) -> Self {
        Self {
            state: self.state.clone(),
            drop_log: None,
        }
    }

    fn with_drop_log(&self, log: DropLog) -> Self {
        Self {
            state: self.state.clone(),
            drop_log: Some(log),
        }
    }

    pub fn add_connector(&self, connector: Connector) {
        self.connectors.borrow_mut().push(connector);
    }

    pub fn add_connector_front(&self, connector: Connector) {
        self.connectors.borrow_mut().insert(0, connector);
    }

    pub fn add_encoder(&self, encoder: Encoder) {
        self.encoders.borrow_mut().push(encoder);
    }

    pub fn add_crtc(&self, crtc: Crtc) {
        self.crtcs.borrow_mut().push(crtc);
    }

    /// Complete one in-flight flip and make the card fd readable
    pub fn complete_flip(&self) {
        self.in_flight.set(self.in_flight.get().saturating_sub(1));
        self.completed.set(self.completed.get() + 1);
        (&self.peer).write_all(&[0]).unwrap();
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.get()
    }
}

impl Deref for MockCard {
    type Target = MockCardState;

    fn deref(&self) -> &MockCardState {
        &self.state
    }
}

impl Drop for MockCard {
    fn drop(&mut self) {
        if let Some(log) = &self.drop_log {
            log.borrow_mut().push("card");
        }
    }
}

impl AsFd for MockCard {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl ModeSetting for MockCard {
    fn resources(&self) -> Result<CardResources, KmsError> {
        if self.fail_resources.get() {
            return Err(KmsError::new(
                "drmModeGetResources",
                io::Error::from_raw_os_error(13),
            ));
        }
        Ok(CardResources {
            connectors: self.connectors.borrow().iter().map(|c| c.id).collect(),
            encoders: self.encoders.borrow().iter().map(|e| e.id).collect(),
            crtcs: self.crtcs.borrow().iter().map(|c| c.id).collect(),
        })
    }

    fn connector(&self, id: ConnectorId) -> Option<Connector> {
        self.connectors.borrow().iter().find(|c| c.id == id).cloned()
    }

    fn encoder(&self, id: EncoderId) -> Option<Encoder> {
        self.encoders.borrow().iter().find(|e| e.id == id).copied()
    }

    fn crtc(&self, id: CrtcId) -> Option<Crtc> {
        self.crtcs.borrow().iter().find(|c| c.id == id).copied()
    }

    fn add_framebuffer(
        &self,
        _bo: &BoDescriptor,
        depth: u8,
        bpp: u8,
    ) -> Result<FramebufferId, KmsError> {
        assert_eq!((depth, bpp), (24, 32));
        if self.fail_add_fb.get() {
            return Err(KmsError::new("drmModeAddFB", io::Error::from_raw_os_error(22)));
        }
        let fb = FramebufferId(self.next_fb.get());
        self.next_fb.set(fb.0 + 1);
        self.live_fbs.borrow_mut().push(fb);
        Ok(fb)
    }

    fn remove_framebuffer(&self, fb: FramebufferId) {
        self.live_fbs.borrow_mut().retain(|live| *live != fb);
    }

    fn page_flip(&self, crtc: CrtcId, fb: FramebufferId) -> Result<(), KmsError> {
        if self.fail_page_flip.get() {
            return Err(KmsError::new(
                "drmModePageFlip",
                io::Error::from_raw_os_error(16),
            ));
        }
        self.flips.borrow_mut().push((crtc, fb));
        self.in_flight.set(self.in_flight.get() + 1);
        Ok(())
    }

    fn wait_for_event(&self) -> Result<(), KmsError> {
        self.waits.set(self.waits.get() + 1);
        if self.completed.get() > 0 {
            return Ok(());
        }
        if self.in_flight.get() > 0 {
            self.complete_flip();
            return Ok(());
        }
        Err(KmsError::new("poll", ErrorKind::WouldBlock.into()))
    }

    fn dispatch_events(&self) -> Result<u32, KmsError> {
        let mut buf = [0u8; 16];
        loop {
            match (&self.stream).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(KmsError::new("read", e)),
            }
        }
        Ok(self.completed.replace(0))
    }
}

/// A two-deep swap target handing out numbered buffers
pub struct MockSurface {
    pub width: u32,
    pub height: u32,
    capacity: usize,
    next_bo: u32,
    pub locked: Vec<u32>,
    pub fail_lock: bool,
    drop_log: Option<DropLog>,
}

impl MockSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            capacity: 2,
            next_bo: 0,
            locked: Vec::new(),
            fail_lock: false,
            drop_log: None,
        }
    }
}

impl ScanoutSurface for MockSurface {
    type Bo = u32;

    fn has_free_buffers(&self) -> bool {
        self.locked.len() < self.capacity
    }

    fn lock_front_buffer(&mut self) -> Option<u32> {
        if self.fail_lock {
            return None;
        }
        let bo = self.next_bo;
        self.next_bo += 1;
        self.locked.push(bo);
        Some(bo)
    }

    fn describe(&self, bo: u32) -> BoDescriptor {
        BoDescriptor {
            width: self.width,
            height: self.height,
            stride: self.width * 4,
            handle: bo,
        }
    }

    fn release_buffer(&mut self, bo: u32) {
        self.locked.retain(|locked| *locked != bo);
    }
}

impl Drop for MockSurface {
    fn drop(&mut self) {
        if let Some(log) = &self.drop_log {
            log.borrow_mut().push("surface");
        }
    }
}

pub struct MockDevice {
    fail_surface: bool,
    drop_log: DropLog,
}

impl DisplayDevice for MockDevice {
    type Surface = MockSurface;

    fn create_surface(&self, width: u32, height: u32) -> Result<MockSurface, BackendError> {
        if self.fail_surface {
            return Err(BackendError::SurfaceCreate { width, height });
        }
        let mut surface = MockSurface::new(width, height);
        surface.drop_log = Some(self.drop_log.clone());
        Ok(surface)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.drop_log.borrow_mut().push("device");
    }
}

/// Hands out views of one simulated card
pub struct MockPlatform {
    pub card: MockCard,
    pub drop_log: DropLog,
    pub fail_open: bool,
    pub fail_device: bool,
    pub fail_surface: bool,
}

impl MockPlatform {
    pub fn new(card: MockCard) -> Self {
        Self {
            card,
            drop_log: DropLog::default(),
            fail_open: false,
            fail_device: false,
            fail_surface: false,
        }
    }
}

impl Platform for MockPlatform {
    type Card = MockCard;
    type Device = MockDevice;

    fn open_card(&self, path: &Path) -> Result<MockCard, BackendError> {
        if self.fail_open {
            return Err(BackendError::CardOpen {
                path: path.to_path_buf(),
                source: ErrorKind::NotFound.into(),
            });
        }
        Ok(self.card.with_drop_log(self.drop_log.clone()))
    }

    fn create_device(&self, _card: &MockCard) -> Result<MockDevice, BackendError> {
        if self.fail_device {
            return Err(BackendError::DeviceCreate);
        }
        Ok(MockDevice {
            fail_surface: self.fail_surface,
            drop_log: self.drop_log.clone(),
        })
    }
}

impl Drop for MockPlatform {
    fn drop(&mut self) {
        self.drop_log.borrow_mut().push("platform");
    }
}

/// Records reported resolutions
#[derive(Debug, Default)]
pub struct RecordingOutput {
    pub reports: Vec<(u32, u32)>,
}

impl ResolutionListener for RecordingOutput {
    fn report_resolution(&mut self, width: u32, height: u32) {
        self.reports.push((width, height));
    }
}
