//! DRM device management
//!
//! Opens a DRM device (/dev/dri/card*) and exposes the queries the
//! catalog and the committer need. A closed device stays a valid Rust
//! value, but every query on it fails with `InvalidHandle`.

use drm::control::{connector, crtc, encoder, Device as ControlDevice, ResourceHandles};
use drm::Device as BasicDevice;
use log::{debug, info};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{KmsError, KmsResult};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an opened device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Allocate a fresh id; catalogs built by hand need one too
    pub fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Open DRM file; the drm crate's traits hang off this
#[derive(Debug)]
pub(crate) struct Card(File);

// Trait implementations required by drm crate
impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl BasicDevice for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Duplicate the fd so a scanout can outlive a borrow of the device
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        self.0.try_clone().map(Card)
    }
}

/// DRM device wrapper
#[derive(Debug)]
pub struct Device {
    card: Option<Card>,
    path: PathBuf,
    id: DeviceId,
}

impl Device {
    /// Open DRM device
    ///
    /// # Arguments
    /// * `path` - Device path (e.g., "/dev/dri/card0")
    pub fn open<P: AsRef<Path>>(path: P) -> KmsResult<Self> {
        let path = path.as_ref();
        info!("Opening DRM device: {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| KmsError::DeviceOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;

        let id = DeviceId::next();
        debug!("DRM device {} opened as {}", path.display(), id);

        Ok(Self {
            card: Some(Card(file)),
            path: path.to_path_buf(),
            id,
        })
    }

    /// Release the device. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(card) = self.card.take() {
            // Only fails when we never were master
            let _ = card.release_master_lock();
            info!("Closed DRM device: {}", self.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.card.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Borrow the open card, or fail fast on a closed handle
    pub(crate) fn card(&self) -> KmsResult<&Card> {
        self.card.as_ref().ok_or_else(|| {
            KmsError::InvalidHandle(format!("DRM device {} is closed", self.path.display()))
        })
    }

    fn query_failed(&self, what: &'static str) -> impl FnOnce(io::Error) -> KmsError + '_ {
        move |source| KmsError::ResourceQueryFailed {
            path: self.path.clone(),
            what,
            source,
        }
    }

    /// Get resource handles
    pub fn resource_handles(&self) -> KmsResult<ResourceHandles> {
        self.card()?
            .resource_handles()
            .map_err(self.query_failed("resources"))
    }

    /// Get connector info
    ///
    /// With `force_probe` the kernel re-reads EDID and connection state.
    pub fn get_connector(
        &self,
        handle: connector::Handle,
        force_probe: bool,
    ) -> KmsResult<connector::Info> {
        self.card()?
            .get_connector(handle, force_probe)
            .map_err(self.query_failed("connector"))
    }

    /// Get encoder info
    pub fn get_encoder(&self, handle: encoder::Handle) -> KmsResult<encoder::Info> {
        self.card()?
            .get_encoder(handle)
            .map_err(self.query_failed("encoder"))
    }

    /// Get CRTC info
    pub fn get_crtc(&self, handle: crtc::Handle) -> KmsResult<crtc::Info> {
        self.card()?
            .get_crtc(handle)
            .map_err(self.query_failed("CRTC"))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}
