//! Resource catalog
//!
//! Immutable snapshot of the connectors, CRTCs and encoders a device
//! reports at one point in time. Fetched fresh for every operation and
//! dropped as a unit when that operation is done.

use drm::control::{connector, crtc, encoder, Mode};
use log::{debug, info, warn};

use super::device::{Device, DeviceId};
use super::error::KmsResult;
use super::mode::{describe, is_preferred};

/// Kernel-style connector type name (as in "HDMI-A-1")
pub fn interface_name(interface: connector::Interface) -> &'static str {
    use connector::Interface;
    match interface {
        Interface::VGA => "VGA",
        Interface::DVII => "DVI-I",
        Interface::DVID => "DVI-D",
        Interface::DVIA => "DVI-A",
        Interface::Composite => "Composite",
        Interface::SVideo => "SVIDEO",
        Interface::LVDS => "LVDS",
        Interface::Component => "Component",
        Interface::NinePinDIN => "DIN",
        Interface::DisplayPort => "DP",
        Interface::HDMIA => "HDMI-A",
        Interface::HDMIB => "HDMI-B",
        Interface::TV => "TV",
        Interface::EmbeddedDisplayPort => "eDP",
        Interface::Virtual => "Virtual",
        Interface::DSI => "DSI",
        _ => "Unknown",
    }
}

pub fn state_name(state: connector::State) -> &'static str {
    match state {
        connector::State::Connected => "connected",
        connector::State::Disconnected => "disconnected",
        _ => "unknown",
    }
}

/// Snapshot of one connector
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSnapshot {
    pub handle: connector::Handle,
    pub interface: connector::Interface,
    pub interface_id: u32,
    pub state: connector::State,
    /// Advertised modes in kernel order; empty when EDID is missing
    pub modes: Vec<Mode>,
    pub current_encoder: Option<encoder::Handle>,
    pub encoders: Vec<encoder::Handle>,
}

impl ConnectorSnapshot {
    pub fn from_info(info: &connector::Info) -> Self {
        Self {
            handle: info.handle(),
            interface: info.interface(),
            interface_id: info.interface_id(),
            state: info.state(),
            modes: info.modes().to_vec(),
            current_encoder: info.current_encoder(),
            encoders: info.encoders().to_vec(),
        }
    }

    pub fn id(&self) -> u32 {
        self.handle.into()
    }

    /// e.g. "HDMI-A-1"
    pub fn name(&self) -> String {
        format!("{}-{}", interface_name(self.interface), self.interface_id)
    }

    pub fn is_connected(&self) -> bool {
        self.state == connector::State::Connected
    }

    /// Preferred mode if the driver flagged one, else the first listed
    pub fn default_mode(&self) -> Option<&Mode> {
        self.modes
            .iter()
            .find(|m| is_preferred(m))
            .or_else(|| self.modes.first())
    }
}

/// Snapshot of one encoder
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSnapshot {
    pub handle: encoder::Handle,
    /// CRTC the encoder currently feeds
    pub crtc: Option<crtc::Handle>,
    /// CRTCs the encoder can feed, in catalog order
    pub possible_crtcs: Vec<crtc::Handle>,
}

/// Snapshot of a device's display topology
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    device: DeviceId,
    connectors: Vec<ConnectorSnapshot>,
    crtcs: Vec<crtc::Handle>,
    encoders: Vec<EncoderSnapshot>,
    skipped: Vec<connector::Handle>,
}

impl ResourceCatalog {
    pub fn new(
        device: DeviceId,
        connectors: Vec<ConnectorSnapshot>,
        crtcs: Vec<crtc::Handle>,
        encoders: Vec<EncoderSnapshot>,
    ) -> Self {
        Self {
            device,
            connectors,
            crtcs,
            encoders,
            skipped: Vec::new(),
        }
    }

    /// Query the device's current topology.
    ///
    /// A connector or encoder whose detail query fails is logged and left
    /// out; only a failure to list the resources fails the fetch.
    pub fn fetch(device: &Device, force_probe: bool) -> KmsResult<Self> {
        let resources = device.resource_handles()?;

        info!(
            "DRM resources: connectors={}, crtcs={}, encoders={}",
            resources.connectors().len(),
            resources.crtcs().len(),
            resources.encoders().len(),
        );

        let mut encoders = Vec::with_capacity(resources.encoders().len());
        for &handle in resources.encoders() {
            match device.get_encoder(handle) {
                Ok(info) => encoders.push(EncoderSnapshot {
                    handle,
                    crtc: info.crtc(),
                    possible_crtcs: resources.filter_crtcs(info.possible_crtcs()),
                }),
                Err(e) => warn!("Skipping encoder {}: {}", u32::from(handle), e),
            }
        }

        Ok(Self::collect(
            device.id(),
            resources.connectors(),
            resources.crtcs().to_vec(),
            encoders,
            |handle| {
                device
                    .get_connector(handle, force_probe)
                    .map(|info| ConnectorSnapshot::from_info(&info))
            },
        ))
    }

    /// Snapshot every connector in `handles` with `query`. A failed query
    /// is logged and recorded in `skipped`; the rest are still collected.
    pub(crate) fn collect<F>(
        device: DeviceId,
        handles: &[connector::Handle],
        crtcs: Vec<crtc::Handle>,
        encoders: Vec<EncoderSnapshot>,
        mut query: F,
    ) -> Self
    where
        F: FnMut(connector::Handle) -> KmsResult<ConnectorSnapshot>,
    {
        let mut connectors = Vec::with_capacity(handles.len());
        let mut skipped = Vec::new();
        for &handle in handles {
            match query(handle) {
                Ok(snapshot) => {
                    debug!(
                        "Connector {} ({}): {}, {} modes",
                        snapshot.id(),
                        snapshot.name(),
                        state_name(snapshot.state),
                        snapshot.modes.len()
                    );
                    connectors.push(snapshot);
                }
                Err(e) => {
                    warn!("Skipping connector {}: {}", u32::from(handle), e);
                    skipped.push(handle);
                }
            }
        }

        let mut catalog = Self::new(device, connectors, crtcs, encoders);
        catalog.skipped = skipped;
        catalog
    }

    /// Device this snapshot was fetched from
    pub fn device_id(&self) -> DeviceId {
        self.device
    }

    pub fn connectors(&self) -> &[ConnectorSnapshot] {
        &self.connectors
    }

    pub fn connector(&self, id: u32) -> Option<&ConnectorSnapshot> {
        self.connectors.iter().find(|c| c.id() == id)
    }

    pub fn connected(&self) -> impl Iterator<Item = &ConnectorSnapshot> {
        self.connectors.iter().filter(|c| c.is_connected())
    }

    /// CRTCs in the order the kernel listed them
    pub fn crtcs(&self) -> &[crtc::Handle] {
        &self.crtcs
    }

    pub fn has_crtc(&self, crtc: crtc::Handle) -> bool {
        self.crtcs.contains(&crtc)
    }

    pub fn encoders(&self) -> &[EncoderSnapshot] {
        &self.encoders
    }

    pub fn encoder(&self, handle: encoder::Handle) -> Option<&EncoderSnapshot> {
        self.encoders.iter().find(|e| e.handle == handle)
    }

    /// Connectors whose detail query failed during fetch
    pub fn skipped(&self) -> &[connector::Handle] {
        &self.skipped
    }

    /// Connectors currently routed to `crtc` through their encoder
    pub fn connectors_on_crtc(&self, crtc: crtc::Handle) -> Vec<connector::Handle> {
        self.connectors
            .iter()
            .filter(|c| {
                c.current_encoder
                    .and_then(|e| self.encoder(e))
                    .and_then(|e| e.crtc)
                    == Some(crtc)
            })
            .map(|c| c.handle)
            .collect()
    }

    /// One line per connector, for debug logging
    pub fn summary(&self) -> Vec<String> {
        self.connectors
            .iter()
            .map(|c| {
                let mode = c.default_mode().map(describe).unwrap_or_else(|| "no modes".into());
                format!("{} [{}] {}: {}", c.id(), c.name(), state_name(c.state), mode)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::error::KmsError;
    use crate::kms::resolver::ModeResolver;
    use crate::kms::testing::{catalog, connector, connector_handle, crtc, driver_mode, encoder};
    use drm::control::connector::State;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_collect_skips_failed_connector() {
        let handles = [connector_handle(5), connector_handle(6), connector_handle(7)];
        let cat = ResourceCatalog::collect(
            DeviceId::next(),
            &handles,
            vec![crtc(41)],
            Vec::new(),
            |handle| match u32::from(handle) {
                // EACCES
                6 => Err(KmsError::ResourceQueryFailed {
                    path: PathBuf::from("/dev/dri/card0"),
                    what: "connector",
                    source: io::Error::from_raw_os_error(13),
                }),
                id => Ok(connector(
                    id,
                    State::Connected,
                    vec![driver_mode("1920x1080", 60, true)],
                )),
            },
        );

        assert_eq!(cat.skipped(), &[connector_handle(6)]);
        let ids: Vec<u32> = cat.connectors().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![5, 7]);
        assert_eq!(cat.crtcs(), &[crtc(41)]);

        let resolver = ModeResolver::default();
        assert!(matches!(
            resolver.resolve(&cat, 6, None),
            Err(KmsError::ConnectorNotFound(6))
        ));
        assert_eq!(resolver.resolve(&cat, 7, None).unwrap().crtc(), crtc(41));
    }

    #[test]
    fn test_default_mode_prefers_flagged() {
        let conn = connector(
            5,
            State::Connected,
            vec![
                driver_mode("1280x720", 60, false),
                driver_mode("1920x1080", 60, true),
            ],
        );
        assert_eq!(conn.default_mode(), Some(&driver_mode("1920x1080", 60, true)));
    }

    #[test]
    fn test_default_mode_falls_back_to_first() {
        let conn = connector(
            5,
            State::Connected,
            vec![
                driver_mode("1280x720", 60, false),
                driver_mode("1920x1080", 60, false),
            ],
        );
        assert_eq!(conn.default_mode(), Some(&driver_mode("1280x720", 60, false)));
        assert_eq!(connector(6, State::Connected, vec![]).default_mode(), None);
    }

    #[test]
    fn test_lookup_by_id() {
        let cat = catalog(vec![
            connector(5, State::Connected, vec![]),
            connector(9, State::Disconnected, vec![]),
        ]);
        assert_eq!(cat.connector(9).map(|c| c.state), Some(State::Disconnected));
        assert!(cat.connector(999).is_none());
        assert_eq!(cat.connected().count(), 1);
        assert!(cat.has_crtc(crtc(41)));
        assert!(!cat.has_crtc(crtc(77)));
    }

    #[test]
    fn test_connector_name() {
        let conn = connector(5, State::Connected, vec![]);
        assert_eq!(conn.name(), "HDMI-A-1");
        assert_eq!(state_name(State::Unknown), "unknown");
    }

    #[test]
    fn test_connectors_on_crtc() {
        let mut conn = connector(5, State::Connected, vec![]);
        conn.current_encoder = Some(encoder(30));
        let cat = ResourceCatalog::new(
            DeviceId::next(),
            vec![conn, connector(6, State::Connected, vec![])],
            vec![crtc(41), crtc(42)],
            vec![EncoderSnapshot {
                handle: encoder(30),
                crtc: Some(crtc(42)),
                possible_crtcs: vec![crtc(41), crtc(42)],
            }],
        );
        assert_eq!(cat.connectors_on_crtc(crtc(42)).len(), 1);
        assert!(cat.connectors_on_crtc(crtc(41)).is_empty());
    }

    #[test]
    fn test_summary_mentions_missing_modes() {
        let cat = catalog(vec![connector(7, State::Connected, vec![])]);
        assert_eq!(cat.summary(), vec!["7 [HDMI-A-1] connected: no modes".to_string()]);
    }
}
