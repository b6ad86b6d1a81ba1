//! Assignment of CRTCs to the outputs a configuration wants lit.
//!
//! The search is a plain depth-first backtrack over the output list. The
//! first assignment found under the fixed enumeration order (CRTCs as
//! listed, exact refresh rate before any refresh rate, modes as listed) is
//! the one returned.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{Error, Result};
use crate::modes::Mode;
use crate::monitor::{OutputInfo, Rotation};
use crate::resources::{CrtcId, CrtcResource, OutputId, OutputResource, ScreenResources};

/// What one CRTC will scan out, and to which outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcInfo {
    pub mode: Mode,
    pub x: i32,
    pub y: i32,
    pub rotation: Rotation,
    /// Never empty while the CRTC is part of an assignment.
    pub outputs: Vec<OutputId>,
}

impl CrtcInfo {
    /// Bottom-right corner of the area this CRTC covers, saturating at the
    /// edge of the coordinate space.
    pub fn extent(&self) -> (i32, i32) {
        let (w, h) = self.mode.rotated_size(self.rotation);
        (self.x.saturating_add(w), self.y.saturating_add(h))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrtcAssignment {
    info: BTreeMap<CrtcId, CrtcInfo>,
    primary: Option<OutputId>,
}

/// Whether the refresh rate has to match exactly while picking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    ExactRate,
    AnyRate,
}

impl Pass {
    fn accepts(self, mode: &Mode, output: &OutputInfo) -> bool {
        mode.has_size(output.width, output.height) && (self == Pass::AnyRate || mode.rate == output.rate)
    }
}

impl CrtcAssignment {
    /// Finds CRTCs for every lit output in `outputs` and checks that the
    /// resulting canvas fits what the screen allows.
    pub fn new(screen: &ScreenResources, outputs: &[OutputInfo]) -> Result<CrtcAssignment> {
        let mut assignment = CrtcAssignment::default();

        if !assignment.assign_crtcs(screen, outputs) {
            return Err(Error::Unsatisfiable);
        }

        let (width, height) = assignment.required_virtual_size();
        let range = screen.range;
        // Only the area is compared, not each axis against its own bounds.
        let required_pixels = width as i64 * height as i64;
        if required_pixels < range.min_pixels() || required_pixels > range.max_pixels() {
            return Err(Error::BoundsExceeded {
                requested_width: width,
                requested_height: height,
                min_width: range.min_width,
                min_height: range.min_height,
                max_width: range.max_width,
                max_height: range.max_height,
            });
        }

        debug!("crtc assignment: {assignment:?}");
        Ok(assignment)
    }

    fn assign_crtcs(&mut self, screen: &ScreenResources, outputs: &[OutputInfo]) -> bool {
        let Some((output, rest)) = outputs.split_first() else {
            return true;
        };

        // Turning an output off is always possible.
        if !output.on {
            return self.assign_crtcs(screen, rest);
        }

        let Some(rr_output) = screen.output_by_name(&output.name) else {
            debug!("output {} is not present on this screen", output.name);
            return false;
        };

        for crtc in &screen.crtcs {
            for pass in [Pass::ExactRate, Pass::AnyRate] {
                for mode in screen.output_modes(rr_output) {
                    if !pass.accepts(mode, output) {
                        continue;
                    }

                    if self.assign(screen, crtc, mode, output, rr_output) {
                        if self.assign_crtcs(screen, rest) {
                            return true;
                        }
                        self.unassign(crtc.id, rr_output.id);
                    }
                }
            }
        }

        false
    }

    /// Tries to put `rr_output` on `crtc` with the given mode and the
    /// position and rotation `output` asks for.
    fn assign(
        &mut self,
        screen: &ScreenResources,
        crtc: &CrtcResource,
        mode: &Mode,
        output: &OutputInfo,
        rr_output: &OutputResource,
    ) -> bool {
        if !crtc.can_drive_output(rr_output.id)
            || !rr_output.supports_mode(mode.id)
            || !crtc.supports_rotation(output.rotation)
        {
            return false;
        }

        match self.info.get_mut(&crtc.id) {
            Some(info) => {
                let same_scanout = info.mode == *mode
                    && info.x == output.x
                    && info.y == output.y
                    && info.rotation == output.rotation;
                let can_clone = info.outputs.iter().all(|member| {
                    screen
                        .output(*member)
                        .is_some_and(|member| member.can_clone(rr_output.id))
                });
                if !(same_scanout && can_clone) {
                    return false;
                }
                debug!("cloning {} onto crtc {}", output.name, crtc.id);
                info.outputs.push(rr_output.id);
            }
            None => {
                debug!("trying {} on crtc {} with {}", output.name, crtc.id, mode.get_modestr());
                self.info.insert(
                    crtc.id,
                    CrtcInfo {
                        mode: *mode,
                        x: output.x,
                        y: output.y,
                        rotation: output.rotation,
                        outputs: vec![rr_output.id],
                    },
                );
            }
        }

        if output.primary && self.primary.is_none() {
            self.primary = Some(rr_output.id);
        }
        true
    }

    /// Removes `output` from the group of `crtc`, dropping the group once it
    /// has no outputs left.
    fn unassign(&mut self, crtc: CrtcId, output: OutputId) {
        let Some(info) = self.info.get_mut(&crtc) else {
            return;
        };

        info.outputs.retain(|o| *o != output);
        if self.primary == Some(output) {
            self.primary = None;
        }
        if info.outputs.is_empty() {
            self.info.remove(&crtc);
        }
    }

    /// Smallest canvas covering every assigned CRTC, never below 1x1.
    pub fn required_virtual_size(&self) -> (i32, i32) {
        self.info
            .values()
            .map(CrtcInfo::extent)
            .fold((1, 1), |(width, height), (w, h)| (width.max(w), height.max(h)))
    }

    pub fn crtcs(&self) -> impl Iterator<Item = (CrtcId, &CrtcInfo)> {
        self.info.iter().map(|(id, info)| (*id, info))
    }

    pub fn get(&self, crtc: CrtcId) -> Option<&CrtcInfo> {
        self.info.get(&crtc)
    }

    pub fn contains(&self, crtc: CrtcId) -> bool {
        self.info.contains_key(&crtc)
    }

    pub fn primary(&self) -> Option<OutputId> {
        self.primary
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }
}
