//! Mode resolution
//!
//! Decides which mode and which CRTC a connector gets, as a pure
//! function over a `ResourceCatalog` snapshot.

use drm::control::{connector, crtc, Mode};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::catalog::{state_name, ConnectorSnapshot, ResourceCatalog};
use super::error::{KmsError, KmsResult};
use super::fallback::FallbackPolicy;
use super::mode::{describe, synthesize_request, ModeRequest};

/// How a CRTC is picked for a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrtcPolicy {
    /// First CRTC in catalog order
    #[default]
    #[serde(rename = "first")]
    FirstListed,
    /// CRTC the connector's encoder drives now, else the first one any of
    /// its encoders can drive
    #[serde(rename = "encoder")]
    EncoderCompatible,
}

impl CrtcPolicy {
    pub fn pick(
        &self,
        catalog: &ResourceCatalog,
        connector: &ConnectorSnapshot,
    ) -> KmsResult<crtc::Handle> {
        let picked = match self {
            CrtcPolicy::FirstListed => catalog.crtcs().first().copied(),
            CrtcPolicy::EncoderCompatible => encoder_crtc(catalog, connector),
        };
        picked.ok_or(KmsError::NoCrtcAvailable(connector.id()))
    }
}

fn encoder_crtc(catalog: &ResourceCatalog, connector: &ConnectorSnapshot) -> Option<crtc::Handle> {
    // First check current encoder
    let current = connector
        .current_encoder
        .and_then(|e| catalog.encoder(e))
        .and_then(|e| e.crtc)
        .filter(|c| catalog.has_crtc(*c));
    if current.is_some() {
        return current;
    }

    connector
        .encoders
        .iter()
        .filter_map(|&e| catalog.encoder(e))
        .find_map(|e| e.possible_crtcs.first().copied())
}

/// A (CRTC, connector, mode) triple ready to commit.
///
/// Borrows the catalog it was resolved from, so it cannot outlive that
/// snapshot; the committer checks it against the device it is applied to.
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration<'a> {
    pub(crate) catalog: &'a ResourceCatalog,
    pub(crate) crtc: crtc::Handle,
    pub(crate) connector: connector::Handle,
    pub(crate) mode: Mode,
    pub(crate) synthetic: bool,
}

impl<'a> ResolvedConfiguration<'a> {
    pub(crate) fn new(
        catalog: &'a ResourceCatalog,
        crtc: crtc::Handle,
        connector: connector::Handle,
        mode: Mode,
        synthetic: bool,
    ) -> Self {
        Self {
            catalog,
            crtc,
            connector,
            mode,
            synthetic,
        }
    }

    /// Same CRTC and connector with another synthesized mode
    pub(crate) fn with_synthetic_mode(&self, mode: Mode) -> Self {
        Self {
            mode,
            synthetic: true,
            ..self.clone()
        }
    }

    pub fn catalog(&self) -> &'a ResourceCatalog {
        self.catalog
    }

    pub fn crtc(&self) -> crtc::Handle {
        self.crtc
    }

    pub fn crtc_id(&self) -> u32 {
        self.crtc.into()
    }

    pub fn connector(&self) -> connector::Handle {
        self.connector
    }

    pub fn connector_id(&self) -> u32 {
        self.connector.into()
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// True when the mode was built here rather than advertised
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

/// Resolves connector + optional mode request into a configuration
#[derive(Debug, Clone)]
pub struct ModeResolver {
    strict: bool,
    crtc_policy: CrtcPolicy,
    fallback: FallbackPolicy,
}

impl Default for ModeResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ModeResolver {
    /// `strict`: requested modes must be advertised by the connector
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            crtc_policy: CrtcPolicy::default(),
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_crtc_policy(mut self, crtc_policy: CrtcPolicy) -> Self {
        self.crtc_policy = crtc_policy;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn resolve<'a>(
        &self,
        catalog: &'a ResourceCatalog,
        connector_id: u32,
        requested: Option<&ModeRequest>,
    ) -> KmsResult<ResolvedConfiguration<'a>> {
        let connector = catalog
            .connector(connector_id)
            .ok_or(KmsError::ConnectorNotFound(connector_id))?;

        if !connector.is_connected() {
            return Err(KmsError::ConnectorNotConnected {
                connector: connector_id,
                state: state_name(connector.state),
            });
        }

        let (mode, synthetic) = match requested {
            Some(request) => self.requested_mode(connector, request)?,
            None => match connector.default_mode() {
                Some(mode) => (*mode, false),
                None => {
                    info!(
                        "Connector {} advertises no modes, using fallback",
                        connector_id
                    );
                    let mode = self.fallback.primary().ok_or_else(|| {
                        KmsError::ModeNotAvailable {
                            connector: connector_id,
                            mode: "fallback".to_string(),
                        }
                    })?;
                    (mode, true)
                }
            },
        };

        let crtc = self.crtc_policy.pick(catalog, connector)?;
        debug!(
            "Resolved connector {} -> CRTC {}, mode {}{}",
            connector_id,
            u32::from(crtc),
            describe(&mode),
            if synthetic { " (synthetic)" } else { "" }
        );

        Ok(ResolvedConfiguration::new(
            catalog,
            crtc,
            connector.handle,
            mode,
            synthetic,
        ))
    }

    fn requested_mode(
        &self,
        connector: &ConnectorSnapshot,
        request: &ModeRequest,
    ) -> KmsResult<(Mode, bool)> {
        if let Some(mode) = connector.modes.iter().find(|m| request.matches(m)) {
            return Ok((*mode, false));
        }

        if self.strict {
            return Err(KmsError::ModeNotAvailable {
                connector: connector.id(),
                mode: request.to_string(),
            });
        }

        warn!(
            "Mode {} not advertised by connector {}, attempting anyway",
            request,
            connector.id()
        );
        Ok((synthesize_request(request, self.fallback.modes()), true))
    }
}
