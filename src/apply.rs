//! Pushes a solved [`CrtcAssignment`] to the display server.

use std::path::Path;

use log::{error, info, warn};

use crate::assignment::CrtcAssignment;
use crate::backend::{CrtcConfig, DisplayBackend};
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::resources::{CrtcResource, ScreenResources};
use crate::store::ConfigStore;

/// Resolution assumed when reporting the physical canvas size.
const ASSUMED_DPI: f64 = 96.0;
const MM_PER_INCH: f64 = 25.4;

fn pixels_to_mm(pixels: i32) -> i32 {
    (pixels as f64 / ASSUMED_DPI * MM_PER_INCH).round() as i32
}

/// Whether `crtc` is lit and reaches past a `width` x `height` canvas.
fn exceeds_canvas(screen: &ScreenResources, crtc: &CrtcResource, width: i32, height: i32) -> bool {
    let Some(mode) = crtc.current_mode.and_then(|id| screen.mode(id)) else {
        return false;
    };
    let (w, h) = mode.rotated_size(crtc.current_rotation);
    crtc.x.saturating_add(w) > width || crtc.y.saturating_add(h) > height
}

/// Reprograms the hardware so it shows `assignment`.
///
/// CRTCs that are not part of the assignment, or that would stick out of
/// the new canvas, are switched off first. The first of those that fails
/// aborts the whole apply. The remaining CRTCs are then all configured even
/// when some of them fail; the first failure is returned afterwards.
pub fn apply_assignment(
    assignment: &CrtcAssignment,
    screen: &ScreenResources,
    backend: &mut dyn DisplayBackend,
    timestamp: u32,
) -> Result<()> {
    let (required_width, required_height) = assignment.required_virtual_size();
    let (width, height) = screen.range.clamp(required_width, required_height);

    for crtc in &screen.crtcs {
        if crtc.current_mode.is_none() {
            continue;
        }
        if assignment.contains(crtc.id) && !exceeds_canvas(screen, crtc, width, height) {
            continue;
        }

        info!("turning off crtc {}", crtc.id);
        if let Err(reason) = backend.set_crtc_config(&CrtcConfig::off(crtc.id, timestamp)) {
            error!("failed to turn off crtc {}: {reason}", crtc.id);
            return Err(Error::HardwareConfigureFailed { crtc: crtc.id, reason });
        }
    }

    let (width_mm, height_mm) = (pixels_to_mm(width), pixels_to_mm(height));
    info!("resizing canvas to {width}x{height} ({width_mm}x{height_mm} mm)");
    if let Err(e) = backend.set_screen_size(width, height, width_mm, height_mm) {
        warn!("failed to resize canvas: {e}");
    }

    let mut first_failure = None;
    for (id, info) in assignment.crtcs() {
        info!(
            "configuring crtc {id}: {} at ({}, {}) rotation {} for outputs {:?}",
            info.mode.get_modestr(),
            info.x,
            info.y,
            info.rotation.name(),
            info.outputs
        );
        let config = CrtcConfig {
            crtc: id,
            timestamp,
            x: info.x,
            y: info.y,
            mode: Some(info.mode.id),
            rotation: info.rotation,
            outputs: &info.outputs,
        };
        if let Err(reason) = backend.set_crtc_config(&config) {
            error!("failed to configure crtc {id}: {reason}");
            if first_failure.is_none() {
                first_failure = Some(Error::HardwareConfigureFailed { crtc: id, reason });
            }
        }
    }

    if let Err(e) = backend.set_primary_output(assignment.primary()) {
        warn!("failed to set primary output: {e}");
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Solves `config` against `screen` and applies the result.
pub fn apply(
    config: &Configuration,
    screen: &ScreenResources,
    backend: &mut dyn DisplayBackend,
    timestamp: u32,
) -> Result<()> {
    let assignment = CrtcAssignment::new(screen, &config.make_outputs())?;
    apply_assignment(&assignment, screen, backend, timestamp)
}

/// Applies whatever configuration stored at `path` fits the hardware
/// currently reported by `backend`.
pub fn apply_from_file(path: &Path, backend: &mut dyn DisplayBackend, timestamp: u32) -> Result<()> {
    let screen = backend.screen_resources()?;
    let config = ConfigStore::load_matching_from(path, &screen)?;
    info!("applying configuration from {}", path.display());
    apply(&config, &screen, backend, timestamp)
}
