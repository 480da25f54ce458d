//! DRM display management
//!
//! Mode setting: commit a resolved configuration, keep its scanout
//! buffer alive, and save/restore the CRTC state around it.

use drm::buffer::DrmFourcc;
use drm::control::dumbbuffer::DumbBuffer;
use drm::control::{connector, crtc, framebuffer, Device as ControlDevice, Mode};
use drm::Device as BasicDevice;
use log::{debug, info, warn};
use std::io;

use super::device::{Card, Device, DeviceId};
use super::error::{KmsError, KmsResult};
use super::mode::{describe, mode_name};
use super::resolver::ResolvedConfiguration;
use crate::constants::{SCANOUT_BPP, SCANOUT_DEPTH};

/// The hardware side of a commit
pub trait ModesetTarget {
    /// Keeps the committed output lit while alive
    type Scanout;

    /// Identity of the open device; `InvalidHandle` once closed
    fn device_id(&self) -> KmsResult<DeviceId>;

    /// Bind `crtc` to `connector` with `mode`
    fn program(
        &self,
        crtc: crtc::Handle,
        connector: connector::Handle,
        mode: &Mode,
    ) -> io::Result<Self::Scanout>;
}

/// Reject configurations that do not belong to this device's current
/// snapshot, before any ioctl is issued.
pub fn validate(device: DeviceId, config: &ResolvedConfiguration<'_>) -> KmsResult<()> {
    let catalog = config.catalog();

    if catalog.device_id() != device {
        return Err(KmsError::InvalidHandle(format!(
            "configuration for connector {} was resolved on device {}, not {}",
            config.connector_id(),
            catalog.device_id(),
            device
        )));
    }

    if !catalog.has_crtc(config.crtc()) {
        return Err(KmsError::InvalidHandle(format!(
            "CRTC {} is not part of the catalog connector {} was resolved from",
            config.crtc_id(),
            config.connector_id()
        )));
    }

    let connector = catalog
        .connector(config.connector_id())
        .ok_or(KmsError::ConnectorNotFound(config.connector_id()))?;
    if !connector.is_connected() {
        return Err(KmsError::ConnectorNotConnected {
            connector: connector.id(),
            state: super::catalog::state_name(connector.state),
        });
    }

    Ok(())
}

/// Set display mode
///
/// Not transactional: each call stands alone and an earlier commit on
/// another connector is left as it is.
pub fn commit<D: ModesetTarget>(
    device: &D,
    config: &ResolvedConfiguration<'_>,
) -> KmsResult<D::Scanout> {
    validate(device.device_id()?, config)?;

    let scanout = device
        .program(config.crtc(), config.connector(), config.mode())
        .map_err(|source| KmsError::CommitFailed {
            crtc: config.crtc_id(),
            connector: config.connector_id(),
            mode: mode_name(config.mode()),
            source,
        })?;

    info!(
        "Set mode {} on connector {} via CRTC {}",
        describe(config.mode()),
        config.connector_id(),
        config.crtc_id()
    );
    Ok(scanout)
}

impl ModesetTarget for Device {
    type Scanout = Scanout;

    fn device_id(&self) -> KmsResult<DeviceId> {
        self.card()?;
        Ok(self.id())
    }

    fn program(
        &self,
        crtc: crtc::Handle,
        connector: connector::Handle,
        mode: &Mode,
    ) -> io::Result<Scanout> {
        let card = self
            .card()
            .map_err(|e| io::Error::new(io::ErrorKind::NotConnected, e.to_string()))?;

        // Already master when we were the first to open the node
        if let Err(e) = card.acquire_master_lock() {
            debug!("SET_MASTER failed: {}", e);
        }

        let scanout = Scanout::allocate(card, mode)?;
        card.set_crtc(crtc, Some(scanout.handle()), (0, 0), &[connector], Some(*mode))?;
        Ok(scanout)
    }
}

/// Framebuffer scanned out by a committed CRTC.
///
/// Dropping it removes the framebuffer, which turns the output off unless
/// another framebuffer was put on the CRTC first.
#[derive(Debug)]
pub struct Scanout {
    card: Card,
    fb: framebuffer::Handle,
    buffer: Option<DumbBuffer>,
}

impl Scanout {
    /// Zero-filled XRGB8888 dumb buffer the size of `mode`
    fn allocate(card: &Card, mode: &Mode) -> io::Result<Self> {
        let (width, height) = mode.size();
        let card = card.try_clone()?;

        let buffer = card.create_dumb_buffer(
            (width as u32, height as u32),
            DrmFourcc::Xrgb8888,
            SCANOUT_BPP,
        )?;
        let fb = match card.add_framebuffer(&buffer, SCANOUT_DEPTH, SCANOUT_BPP) {
            Ok(fb) => fb,
            Err(e) => {
                let _ = card.destroy_dumb_buffer(buffer);
                return Err(e);
            }
        };

        debug!(
            "Framebuffer created: id={}, {}x{}",
            u32::from(fb),
            width,
            height
        );

        Ok(Self {
            card,
            fb,
            buffer: Some(buffer),
        })
    }

    pub fn handle(&self) -> framebuffer::Handle {
        self.fb
    }
}

impl Drop for Scanout {
    fn drop(&mut self) {
        let _ = self.card.destroy_framebuffer(self.fb);
        if let Some(buffer) = self.buffer.take() {
            let _ = self.card.destroy_dumb_buffer(buffer);
        }
    }
}

/// Connectors to put back on the CRTC `config` targets. An active CRTC
/// whose connectors could not be traced through the encoders is restored
/// onto the connector being set.
fn saved_connectors(config: &ResolvedConfiguration<'_>, active: bool) -> Vec<connector::Handle> {
    let connectors = config.catalog().connectors_on_crtc(config.crtc());
    if connectors.is_empty() && active {
        warn!(
            "No connector traced to CRTC {}, restoring it onto connector {}",
            config.crtc_id(),
            config.connector_id()
        );
        return vec![config.connector()];
    }
    connectors
}

/// Save and restore the previous CRTC configuration
#[derive(Debug)]
pub struct SavedCrtc {
    info: crtc::Info,
    connectors: Vec<connector::Handle>,
}

impl SavedCrtc {
    pub fn save(device: &Device, config: &ResolvedConfiguration<'_>) -> KmsResult<Self> {
        let info = device.get_crtc(config.crtc())?;
        let connectors = saved_connectors(config, info.mode().is_some());
        debug!(
            "Saved CRTC {}: mode={:?}, connectors={}",
            config.crtc_id(),
            info.mode().map(|m| describe(&m)),
            connectors.len()
        );
        Ok(Self { info, connectors })
    }

    /// Put the CRTC back as it was, or switch it off if it was idle
    pub fn restore(&self, device: &Device) -> KmsResult<()> {
        let card = device.card()?;
        let crtc = self.info.handle();

        let result = match (self.info.framebuffer(), self.info.mode()) {
            (Some(fb), Some(mode)) if !self.connectors.is_empty() => card.set_crtc(
                crtc,
                Some(fb),
                self.info.position(),
                &self.connectors,
                Some(mode),
            ),
            _ => card.set_crtc(crtc, None, (0, 0), &[], None),
        };

        result.map_err(|source| KmsError::CommitFailed {
            crtc: crtc.into(),
            connector: self.connectors.first().map_or(0, |&c| c.into()),
            mode: self
                .info
                .mode()
                .map_or_else(|| "off".to_string(), |m| mode_name(&m)),
            source,
        })?;

        info!("Restored CRTC {}", u32::from(crtc));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::catalog::ResourceCatalog;
    use crate::kms::testing::{catalog, connector, connector_handle, crtc, driver_mode, FakeCard};
    use drm::control::connector::State;

    fn two_outputs() -> ResourceCatalog {
        catalog(vec![
            connector(5, State::Connected, vec![driver_mode("1920x1080", 60, true)]),
            connector(9, State::Disconnected, vec![]),
        ])
    }

    #[test]
    fn test_commit_programs_hardware() {
        let cat = two_outputs();
        let card = FakeCard::new(cat.device_id());
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(41),
            connector_handle(5),
            driver_mode("1920x1080", 60, true),
            false,
        );

        commit(&card, &config).unwrap();
        assert_eq!(card.attempts(), 1);
    }

    #[test]
    fn test_commit_rejects_foreign_crtc() {
        let cat = two_outputs();
        let card = FakeCard::new(cat.device_id());
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(77),
            connector_handle(5),
            driver_mode("1920x1080", 60, true),
            false,
        );

        let err = commit(&card, &config).unwrap_err();
        assert!(matches!(err, KmsError::InvalidHandle(ref msg) if msg.contains("CRTC 77")));
        assert_eq!(card.attempts(), 0);
    }

    #[test]
    fn test_commit_rejects_other_device() {
        let cat = two_outputs();
        let card = FakeCard::new(DeviceId::next());
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(41),
            connector_handle(5),
            driver_mode("1920x1080", 60, true),
            false,
        );

        assert!(matches!(
            commit(&card, &config),
            Err(KmsError::InvalidHandle(_))
        ));
        assert_eq!(card.attempts(), 0);
    }

    #[test]
    fn test_commit_rejects_disconnected() {
        let cat = two_outputs();
        let card = FakeCard::new(cat.device_id());
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(41),
            connector_handle(9),
            driver_mode("1920x1080", 60, true),
            true,
        );

        assert!(matches!(
            commit(&card, &config),
            Err(KmsError::ConnectorNotConnected { connector: 9, .. })
        ));
        assert_eq!(card.attempts(), 0);
    }

    #[test]
    fn test_commit_failure_carries_os_error() {
        let cat = two_outputs();
        let card = FakeCard::new(cat.device_id()).refuse_connector(5);
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(41),
            connector_handle(5),
            driver_mode("1920x1080", 60, true),
            false,
        );

        match commit(&card, &config) {
            Err(KmsError::CommitFailed {
                crtc,
                connector,
                mode,
                source,
            }) => {
                assert_eq!((crtc, connector), (41, 5));
                assert_eq!(mode, "1920x1080");
                assert_eq!(source.raw_os_error(), Some(22));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_saved_connectors_for_untraced_crtc() {
        let cat = two_outputs();
        let config = ResolvedConfiguration::new(
            &cat,
            crtc(41),
            connector_handle(5),
            driver_mode("1920x1080", 60, true),
            false,
        );

        assert_eq!(saved_connectors(&config, true), vec![connector_handle(5)]);
        assert!(saved_connectors(&config, false).is_empty());
    }

    #[test]
    fn test_closed_device_fails_fast() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut device = Device::open(file.path()).unwrap();
        device.close();
        assert!(matches!(
            ModesetTarget::device_id(&device),
            Err(KmsError::InvalidHandle(_))
        ));
    }
}
