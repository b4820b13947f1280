//! Double-buffered page flipping
//!
//! Two slots track the scanout buffers: `current` is on screen, `next` has
//! been handed to the kernel and is waiting for its flip to complete. Only
//! the completion handler moves `next` into `current`.

use log::{debug, warn};

use crate::backend::device::{CrtcId, FramebufferId, ModeSetting, ScanoutSurface};
use crate::backend::error::{FlipError, KmsError};

/// Framebuffer color depth
pub const FB_DEPTH: u8 = 24;
/// Framebuffer bits per pixel
pub const FB_BPP: u8 = 32;

/// A framebuffer and the buffer object it wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<B> {
    pub fb: Option<FramebufferId>,
    pub bo: Option<B>,
}

impl<B> Default for Slot<B> {
    fn default() -> Self {
        Self { fb: None, bo: None }
    }
}

impl<B> Slot<B> {
    pub fn is_empty(&self) -> bool {
        self.fb.is_none() && self.bo.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipSlots<B> {
    pub current: Slot<B>,
    pub next: Slot<B>,
}

impl<B> Default for FlipSlots<B> {
    fn default() -> Self {
        Self {
            current: Slot::default(),
            next: Slot::default(),
        }
    }
}

impl<B> FlipSlots<B> {
    /// True while a flip has been queued but not completed
    pub fn flip_pending(&self) -> bool {
        !self.next.is_empty()
    }
}

/// A locked buffer and its framebuffer, released unless disarmed
struct PendingFlip<'a, S: ScanoutSurface, K: ModeSetting + ?Sized> {
    surface: &'a mut S,
    kms: &'a K,
    slot: Slot<S::Bo>,
}

impl<S: ScanoutSurface, K: ModeSetting + ?Sized> PendingFlip<'_, S, K> {
    fn disarm(mut self) -> Slot<S::Bo> {
        std::mem::take(&mut self.slot)
    }
}

impl<S: ScanoutSurface, K: ModeSetting + ?Sized> Drop for PendingFlip<'_, S, K> {
    fn drop(&mut self) {
        if let Some(fb) = self.slot.fb.take() {
            self.kms.remove_framebuffer(fb);
        }
        if let Some(bo) = self.slot.bo.take() {
            self.surface.release_buffer(bo);
        }
    }
}

/// Scanout surface plus the flip slots cycling through it
pub struct Swapchain<S: ScanoutSurface> {
    surface: S,
    slots: FlipSlots<S::Bo>,
}

impl<S: ScanoutSurface> Swapchain<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            slots: FlipSlots::default(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn slots(&self) -> &FlipSlots<S::Bo> {
        &self.slots
    }

    /// Queue the surface's newest buffer for scanout on `crtc`.
    ///
    /// If a flip is still outstanding this blocks until it completes so at
    /// most two buffers are ever held by the kernel.
    pub fn request_flip<K: ModeSetting + ?Sized>(
        &mut self,
        kms: &K,
        crtc: CrtcId,
    ) -> Result<(), FlipError> {
        let result = self.try_flip(kms, crtc);
        match &result {
            Ok(()) => {}
            Err(e @ (FlipError::FramebufferCreate(cause) | FlipError::PageFlip(cause))) => {
                warn!("{}: {}", e, cause);
            }
            Err(e) => debug!("Flip not queued: {}", e),
        }
        result
    }

    fn try_flip<K: ModeSetting + ?Sized>(&mut self, kms: &K, crtc: CrtcId) -> Result<(), FlipError> {
        while self.slots.flip_pending() {
            debug!("Previous flip still pending, waiting");
            kms.wait_for_event().map_err(FlipError::Wait)?;
            self.dispatch_events(kms).map_err(FlipError::Wait)?;
        }

        if !self.surface.has_free_buffers() {
            return Err(FlipError::NoBuffers);
        }
        let bo = self
            .surface
            .lock_front_buffer()
            .ok_or(FlipError::LockFailed)?;

        let descriptor = self.surface.describe(bo);
        let mut pending = PendingFlip {
            surface: &mut self.surface,
            kms,
            slot: Slot {
                fb: None,
                bo: Some(bo),
            },
        };

        let fb = kms
            .add_framebuffer(&descriptor, FB_DEPTH, FB_BPP)
            .map_err(FlipError::FramebufferCreate)?;
        pending.slot.fb = Some(fb);

        kms.page_flip(crtc, fb).map_err(FlipError::PageFlip)?;

        self.slots.next = pending.disarm();
        Ok(())
    }

    /// Promote `next` to `current` after the kernel reports a flip done
    pub fn on_flip_complete<K: ModeSetting + ?Sized>(&mut self, kms: &K) {
        if !self.slots.flip_pending() {
            debug!("Ignoring flip completion with no flip pending");
            return;
        }

        let next = std::mem::take(&mut self.slots.next);
        let previous = std::mem::replace(&mut self.slots.current, next);
        if let Some(fb) = previous.fb {
            kms.remove_framebuffer(fb);
        }
        if let Some(bo) = previous.bo {
            self.surface.release_buffer(bo);
        }
    }

    /// Read the card's events and apply each completed flip
    pub fn dispatch_events<K: ModeSetting + ?Sized>(&mut self, kms: &K) -> Result<u32, KmsError> {
        let completed = kms.dispatch_events()?;
        for _ in 0..completed {
            self.on_flip_complete(kms);
        }
        Ok(completed)
    }

    /// Drop every framebuffer and give every buffer back
    pub fn release_all<K: ModeSetting + ?Sized>(&mut self, kms: &K) {
        for slot in [
            std::mem::take(&mut self.slots.next),
            std::mem::take(&mut self.slots.current),
        ] {
            if let Some(fb) = slot.fb {
                kms.remove_framebuffer(fb);
            }
            if let Some(bo) = slot.bo {
                self.surface.release_buffer(bo);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{MockCard, MockSurface};

    const CRTC: CrtcId = CrtcId(30);

    fn swapchain() -> (MockCard, Swapchain<MockSurface>) {
        (MockCard::new(), Swapchain::new(MockSurface::new(640, 480)))
    }

    #[test]
    fn test_first_flip_fills_next() {
        let (card, mut chain) = swapchain();
        chain.request_flip(&card, CRTC).unwrap();

        assert!(chain.slots().flip_pending());
        assert_eq!(chain.slots().next.bo, Some(0));
        assert!(chain.slots().current.is_empty());
        assert_eq!(card.flips.borrow().len(), 1);
        assert_eq!(card.waits.get(), 0);
    }

    #[test]
    fn test_second_flip_drains_one_completion() {
        let (card, mut chain) = swapchain();
        chain.request_flip(&card, CRTC).unwrap();
        chain.request_flip(&card, CRTC).unwrap();

        assert_eq!(card.waits.get(), 1);
        assert_eq!(chain.slots().current.bo, Some(0));
        assert_eq!(chain.slots().next.bo, Some(1));
        assert_eq!(card.live_fbs.borrow().len(), 2);
        assert_eq!(chain.surface().locked, vec![0, 1]);
    }

    #[test]
    fn test_completion_releases_previous_buffer() {
        let (card, mut chain) = swapchain();
        for _ in 0..3 {
            chain.request_flip(&card, CRTC).unwrap();
        }
        card.complete_flip();
        assert_eq!(chain.dispatch_events(&card).unwrap(), 1);

        assert!(!chain.slots().flip_pending());
        assert_eq!(chain.slots().current.bo, Some(2));
        assert_eq!(chain.surface().locked, vec![2]);
        assert_eq!(card.live_fbs.borrow().len(), 1);
    }

    #[test]
    fn test_spurious_completion_is_ignored() {
        let (card, mut chain) = swapchain();
        chain.request_flip(&card, CRTC).unwrap();
        card.complete_flip();
        chain.dispatch_events(&card).unwrap();
        let settled = *chain.slots();

        card.complete_flip();
        chain.dispatch_events(&card).unwrap();
        assert_eq!(*chain.slots(), settled);
        assert_eq!(chain.surface().locked, vec![0]);
    }

    #[test]
    fn test_framebuffer_failure_releases_buffer() {
        let (card, mut chain) = swapchain();
        card.fail_add_fb.set(true);

        let err = chain.request_flip(&card, CRTC).unwrap_err();
        assert!(matches!(err, FlipError::FramebufferCreate(_)));
        assert!(err.is_transient());
        assert!(chain.surface().locked.is_empty());
        assert!(card.live_fbs.borrow().is_empty());
        assert!(!chain.slots().flip_pending());
    }

    #[test]
    fn test_page_flip_failure_releases_everything() {
        let (card, mut chain) = swapchain();
        card.fail_page_flip.set(true);

        let err = chain.request_flip(&card, CRTC).unwrap_err();
        assert!(matches!(err, FlipError::PageFlip(_)));
        assert!(chain.surface().locked.is_empty());
        assert!(card.live_fbs.borrow().is_empty());
        assert!(chain.slots().next.is_empty());

        card.fail_page_flip.set(false);
        chain.request_flip(&card, CRTC).unwrap();
        assert_eq!(chain.surface().locked.len(), 1);
    }

    #[test]
    fn test_no_free_buffers() {
        let (card, mut chain) = swapchain();
        chain.surface_mut().lock_front_buffer();
        chain.surface_mut().lock_front_buffer();

        let err = chain.request_flip(&card, CRTC).unwrap_err();
        assert!(matches!(err, FlipError::NoBuffers));
        assert!(card.live_fbs.borrow().is_empty());
    }

    #[test]
    fn test_lock_failure() {
        let (card, mut chain) = swapchain();
        chain.surface_mut().fail_lock = true;
        assert!(matches!(
            chain.request_flip(&card, CRTC),
            Err(FlipError::LockFailed)
        ));
    }

    #[test]
    fn test_release_all() {
        let (card, mut chain) = swapchain();
        chain.request_flip(&card, CRTC).unwrap();
        chain.request_flip(&card, CRTC).unwrap();

        chain.release_all(&card);
        assert!(chain.surface().locked.is_empty());
        assert!(card.live_fbs.borrow().is_empty());
        assert_eq!(*chain.slots(), FlipSlots::default());
    }
}
