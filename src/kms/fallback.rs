//! Fallback modes for outputs without EDID
//!
//! A connected connector that advertises no modes (EDID read failed, or
//! a dongle that reports nothing) gets a synthesized mode from an ordered
//! table. Each connector is judged on its own.

use drm::control::Mode;
use log::{info, warn};

use super::catalog::{ConnectorSnapshot, ResourceCatalog};
use super::display::{commit, ModesetTarget};
use super::error::{KmsError, KmsResult};
use super::mode::{describe, FallbackMode};
use super::resolver::{CrtcPolicy, ResolvedConfiguration};
use crate::constants::DEFAULT_FALLBACK_MODES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    modes: Vec<FallbackMode>,
    crtc_policy: CrtcPolicy,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            modes: DEFAULT_FALLBACK_MODES.to_vec(),
            crtc_policy: CrtcPolicy::default(),
        }
    }
}

impl FallbackPolicy {
    /// `modes` in preference order; the first one is the primary
    pub fn new(modes: Vec<FallbackMode>, crtc_policy: CrtcPolicy) -> Self {
        Self { modes, crtc_policy }
    }

    pub fn modes(&self) -> &[FallbackMode] {
        &self.modes
    }

    pub fn primary(&self) -> Option<Mode> {
        self.modes.first().map(FallbackMode::to_mode)
    }

    pub fn needs_fallback(connector: &ConnectorSnapshot) -> bool {
        connector.is_connected() && connector.modes.is_empty()
    }

    /// One entry per connected connector without modes: its configuration
    /// bound to the primary fallback mode, or why none could be built.
    pub fn plan<'a>(
        &self,
        catalog: &'a ResourceCatalog,
    ) -> Vec<(u32, KmsResult<ResolvedConfiguration<'a>>)> {
        let primary = self.primary();
        if primary.is_none() {
            warn!("Fallback table is empty");
        }

        catalog
            .connectors()
            .iter()
            .filter(|c| Self::needs_fallback(c))
            .map(|connector| {
                let id = connector.id();
                let config = primary
                    .ok_or_else(|| KmsError::ModeNotAvailable {
                        connector: id,
                        mode: "fallback".to_string(),
                    })
                    .and_then(|mode| {
                        let crtc = self.crtc_policy.pick(catalog, connector)?;
                        Ok(ResolvedConfiguration::new(
                            catalog,
                            crtc,
                            connector.handle,
                            mode,
                            true,
                        ))
                    });
                if let Err(e) = &config {
                    warn!("No fallback for connector {}: {}", id, e);
                }
                (id, config)
            })
            .collect()
    }

    /// Configurations from `plan` that could be built. Connectors with
    /// modes are left alone.
    pub fn scan<'a>(&self, catalog: &'a ResourceCatalog) -> Vec<ResolvedConfiguration<'a>> {
        self.plan(catalog)
            .into_iter()
            .filter_map(|(_, config)| config.ok())
            .collect()
    }
}

/// Result of applying fallback to one connector
#[derive(Debug)]
pub struct FallbackOutcome<S> {
    pub connector: u32,
    /// Applied mode and its live scanout, or the last error
    pub result: Result<(Mode, S), KmsError>,
}

#[derive(Debug)]
pub struct FallbackReport<S> {
    pub outcomes: Vec<FallbackOutcome<S>>,
}

impl<S> FallbackReport<S> {
    /// True when no connector needed fallback
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }
}

/// Scan for connectors needing fallback and commit a mode to each.
///
/// Connectors are committed independently. When the kernel refuses a
/// candidate, the next one in the table is tried for that connector;
/// precondition failures are not retried.
pub fn apply_fallback<D: ModesetTarget>(
    device: &D,
    catalog: &ResourceCatalog,
    policy: &FallbackPolicy,
) -> FallbackReport<D::Scanout> {
    let mut outcomes = Vec::new();

    for (connector, planned) in policy.plan(catalog) {
        let config = match planned {
            Ok(config) => config,
            Err(e) => {
                outcomes.push(FallbackOutcome {
                    connector,
                    result: Err(e),
                });
                continue;
            }
        };
        let mut result = Err(KmsError::ModeNotAvailable {
            connector,
            mode: "fallback".to_string(),
        });

        for candidate in policy.modes() {
            let attempt = config.with_synthetic_mode(candidate.to_mode());
            match commit(device, &attempt) {
                Ok(scanout) => {
                    info!(
                        "Fallback mode {} applied to connector {}",
                        describe(attempt.mode()),
                        connector
                    );
                    result = Ok((*attempt.mode(), scanout));
                    break;
                }
                Err(e @ KmsError::CommitFailed { .. }) => {
                    warn!("{}", e);
                    result = Err(e);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        outcomes.push(FallbackOutcome { connector, result });
    }

    FallbackReport { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::mode::mode_name;
    use crate::kms::testing::{catalog, connector, crtc, driver_mode, FakeCard};
    use drm::control::connector::State;

    #[test]
    fn test_scan_only_connected_without_modes() {
        let cat = catalog(vec![
            connector(5, State::Connected, vec![driver_mode("1920x1080", 60, true)]),
            connector(7, State::Connected, vec![]),
            connector(8, State::Disconnected, vec![]),
            connector(11, State::Connected, vec![]),
        ]);
        let configs = FallbackPolicy::default().scan(&cat);

        let ids: Vec<u32> = configs.iter().map(|c| c.connector_id()).collect();
        assert_eq!(ids, vec![7, 11]);
        for config in &configs {
            assert_eq!(config.crtc(), crtc(41));
            assert_eq!(mode_name(config.mode()), "1920x1080");
            assert_eq!(config.mode().vrefresh(), 60);
            assert!(config.is_synthetic());
        }
    }

    #[test]
    fn test_scan_nothing_to_do() {
        let cat = catalog(vec![connector(
            5,
            State::Connected,
            vec![driver_mode("1920x1080", 60, true)],
        )]);
        assert!(FallbackPolicy::default().scan(&cat).is_empty());
    }

    #[test]
    fn test_scan_with_empty_table() {
        let cat = catalog(vec![connector(7, State::Connected, vec![])]);
        let policy = FallbackPolicy::new(vec![], CrtcPolicy::FirstListed);
        assert!(policy.scan(&cat).is_empty());
    }

    #[test]
    fn test_apply_reports_connector_without_crtc() {
        let cat = ResourceCatalog::new(
            crate::kms::DeviceId::next(),
            vec![connector(7, State::Connected, vec![])],
            Vec::new(),
            Vec::new(),
        );
        let card = FakeCard::new(cat.device_id());

        let report = apply_fallback(&card, &cat, &FallbackPolicy::default());
        assert!(!report.is_empty());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.outcomes[0].connector, 7);
        assert!(matches!(
            report.outcomes[0].result,
            Err(KmsError::NoCrtcAvailable(7))
        ));
        assert_eq!(card.attempts(), 0);
    }

    #[test]
    fn test_plan_keeps_failed_picks() {
        let cat = catalog(vec![
            connector(5, State::Connected, vec![driver_mode("1920x1080", 60, true)]),
            connector(7, State::Connected, vec![]),
        ]);
        let policy = FallbackPolicy::new(vec![], CrtcPolicy::FirstListed);

        let plan = policy.plan(&cat);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].0, 7);
        assert!(matches!(
            plan[0].1,
            Err(KmsError::ModeNotAvailable { connector: 7, .. })
        ));
    }

    #[test]
    fn test_apply_retries_next_candidate() {
        let cat = catalog(vec![connector(7, State::Connected, vec![])]);
        let card = FakeCard::new(cat.device_id()).refuse_width(1920);

        let report = apply_fallback(&card, &cat, &FallbackPolicy::default());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.failures(), 0);
        let (mode, ()) = report.outcomes[0].result.as_ref().unwrap();
        assert_eq!(mode_name(mode), "2560x1440");
        assert_eq!(card.attempts(), 2);
    }

    #[test]
    fn test_apply_records_failure_and_continues() {
        let cat = catalog(vec![
            connector(7, State::Connected, vec![]),
            connector(11, State::Connected, vec![]),
        ]);
        let card = FakeCard::new(cat.device_id()).refuse_connector(7);

        let report = apply_fallback(&card, &cat, &FallbackPolicy::default());
        assert_eq!(report.failures(), 1);
        assert_eq!(report.outcomes[0].connector, 7);
        assert!(matches!(
            report.outcomes[0].result,
            Err(KmsError::CommitFailed { connector: 7, .. })
        ));
        assert!(report.outcomes[1].result.is_ok());
        // three refused candidates for 7, one success for 11
        assert_eq!(card.attempts(), 4);
    }

    #[test]
    fn test_apply_does_not_retry_precondition_failures() {
        let cat = catalog(vec![connector(7, State::Connected, vec![])]);
        let other_device = FakeCard::new(crate::kms::DeviceId::next());

        let report = apply_fallback(&other_device, &cat, &FallbackPolicy::default());
        assert!(matches!(
            report.outcomes[0].result,
            Err(KmsError::InvalidHandle(_))
        ));
        assert_eq!(other_device.attempts(), 0);
    }
}
