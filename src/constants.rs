//! Global constants for kmsmode
//!
//! Device defaults and the built-in fallback timing table.

use crate::kms::FallbackMode;

// ============================================================================
// Device
// ============================================================================

/// DRM node used when neither the command line nor the config names one
pub const DEFAULT_DEVICE_PATH: &str = "/dev/dri/card0";

// ============================================================================
// Modes
// ============================================================================

/// Size of drm_mode_modeinfo.name, NUL terminator included
pub const MODE_NAME_LEN: usize = 32;

/// Dumb buffer format for scanout: XRGB8888
pub const SCANOUT_DEPTH: u32 = 24;
pub const SCANOUT_BPP: u32 = 32;

// ============================================================================
// Fallback Timings
// ============================================================================

/// Modes tried, in order, on connected outputs that advertise none.
///
/// 1920x1080@60 and 3840x2160@30 are the CEA-861 timings (VIC 16, VIC 95);
/// 2560x1440@60 is CVT reduced blanking.
pub const DEFAULT_FALLBACK_MODES: [FallbackMode; 3] = [
    FallbackMode {
        width: 1920,
        height: 1080,
        refresh: 60,
        clock: 148_500,
        hsync: [2008, 2052, 2200],
        vsync: [1084, 1089, 1125],
    },
    FallbackMode {
        width: 2560,
        height: 1440,
        refresh: 60,
        clock: 241_500,
        hsync: [2608, 2640, 2720],
        vsync: [1443, 1448, 1481],
    },
    FallbackMode {
        width: 3840,
        height: 2160,
        refresh: 30,
        clock: 297_000,
        hsync: [4016, 4104, 4400],
        vsync: [2168, 2178, 2250],
    },
];
