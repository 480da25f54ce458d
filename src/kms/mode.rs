//! Display mode helpers
//!
//! Mode requests as typed by the user, mode naming, and construction of
//! synthetic modes for outputs that advertise none.

use anyhow::ensure;
use drm::control::{Mode, ModeFlags, ModeTypeFlags};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::zip;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::MODE_NAME_LEN;

/// Mode name as reported by the kernel (e.g. "1920x1080")
pub fn mode_name(mode: &Mode) -> String {
    mode.name().to_string_lossy().into_owned()
}

/// Human-readable "NAME @ N Hz"
pub fn describe(mode: &Mode) -> String {
    format!("{} @ {} Hz", mode_name(mode), mode.vrefresh())
}

pub fn is_preferred(mode: &Mode) -> bool {
    mode.mode_type().contains(ModeTypeFlags::PREFERRED)
}

/// Parse a strict "WIDTHxHEIGHT" name
pub fn parse_size(name: &str) -> Option<(u16, u16)> {
    let (w, h) = name.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Convert a string to a mode name slice (max 31 chars + null terminator).
fn modeinfo_name(name: &str) -> [core::ffi::c_char; MODE_NAME_LEN] {
    let mut out: [core::ffi::c_char; MODE_NAME_LEN] = [0; MODE_NAME_LEN];

    for (a, b) in zip(&mut out[..MODE_NAME_LEN - 1], name.as_bytes()) {
        // Can be u8 on aarch64 and i8 on x86_64.
        *a = *b as _;
    }

    out
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid mode '{0}': expected NAME or NAME@REFRESH (e.g. 1920x1080@60)")]
pub struct InvalidModeRequest(String);

/// A mode asked for by name, optionally pinned to a refresh rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeRequest {
    pub name: String,
    pub refresh: Option<u32>,
}

impl ModeRequest {
    pub fn new(name: impl Into<String>, refresh: Option<u32>) -> Self {
        Self {
            name: name.into(),
            refresh,
        }
    }

    /// Pin the refresh rate, replacing any parsed from the name
    pub fn with_refresh(mut self, refresh: u32) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Exact name match; refresh must match too when one was given
    pub fn matches(&self, mode: &Mode) -> bool {
        mode.name().to_bytes() == self.name.as_bytes()
            && self.refresh.map_or(true, |r| r == mode.vrefresh())
    }
}

impl FromStr for ModeRequest {
    type Err = InvalidModeRequest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidModeRequest(s.to_string());
        let (name, refresh) = match s.split_once('@') {
            Some((name, hz)) => (name, Some(hz.parse().map_err(|_| invalid())?)),
            None => (s, None),
        };
        if name.is_empty() || name.len() >= MODE_NAME_LEN {
            return Err(invalid());
        }
        Ok(Self::new(name, refresh))
    }
}

impl fmt::Display for ModeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.refresh {
            Some(hz) => write!(f, "{}@{}", self.name, hz),
            None => f.write_str(&self.name),
        }
    }
}

/// One row of the fallback table: a full set of timings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackMode {
    pub width: u16,
    pub height: u16,
    pub refresh: u32,
    /// Pixel clock in kHz
    pub clock: u32,
    /// Sync start, sync end, total
    pub hsync: [u16; 3],
    pub vsync: [u16; 3],
}

impl FallbackMode {
    pub fn name(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Check the timings are monotonic, as the kernel requires
    pub fn validate(&self) -> anyhow::Result<()> {
        let [hss, hse, ht] = self.hsync;
        let [vss, vse, vt] = self.vsync;
        ensure!(
            self.width < hss && hss < hse && hse < ht,
            "{}: horizontal timings must satisfy width < sync start < sync end < total",
            self.name()
        );
        ensure!(
            self.height < vss && vss < vse && vse < vt,
            "{}: vertical timings must satisfy height < sync start < sync end < total",
            self.name()
        );
        ensure!(self.clock > 0, "{}: pixel clock must be non-zero", self.name());
        ensure!(self.refresh > 0, "{}: refresh must be non-zero", self.name());
        Ok(())
    }

    /// Build a user-defined mode with positive H/V sync.
    ///
    /// No EDID backs these timings, so polarity is a fixed choice.
    pub fn to_mode(&self) -> Mode {
        let [hsync_start, hsync_end, htotal] = self.hsync;
        let [vsync_start, vsync_end, vtotal] = self.vsync;

        // https://www.kernel.org/doc/html/latest/gpu/drm-uapi.html#c.drm_mode_modeinfo
        Mode::from(drm_ffi::drm_mode_modeinfo {
            clock: self.clock,
            hdisplay: self.width,
            hsync_start,
            hsync_end,
            htotal,
            vdisplay: self.height,
            vsync_start,
            vsync_end,
            vtotal,
            vrefresh: self.refresh,
            flags: (ModeFlags::PHSYNC | ModeFlags::PVSYNC).bits(),
            type_: ModeTypeFlags::USERDEF.bits(),
            name: modeinfo_name(&self.name()),
            // Defaults
            hskew: 0,
            vscan: 0,
        })
    }
}

/// Build a mode for a request no connector advertised.
///
/// Uses table timings when the request names a "WxH" size the table knows;
/// otherwise the mode carries only name, size and refresh and it is up to
/// the driver to accept it.
pub fn synthesize_request(request: &ModeRequest, table: &[FallbackMode]) -> Mode {
    let size = parse_size(&request.name);

    if let Some((width, height)) = size {
        let known = table.iter().find(|m| {
            m.width == width
                && m.height == height
                && request.refresh.map_or(true, |r| r == m.refresh)
        });
        if let Some(entry) = known {
            return entry.to_mode();
        }
    }

    let (hdisplay, vdisplay) = size.unwrap_or((0, 0));
    Mode::from(drm_ffi::drm_mode_modeinfo {
        hdisplay,
        vdisplay,
        vrefresh: request.refresh.unwrap_or(0),
        type_: ModeTypeFlags::USERDEF.bits(),
        name: modeinfo_name(&request.name),
        clock: 0,
        hsync_start: 0,
        hsync_end: 0,
        htotal: 0,
        hskew: 0,
        vsync_start: 0,
        vsync_end: 0,
        vtotal: 0,
        vscan: 0,
        flags: 0,
    })
}
