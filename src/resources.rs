use crate::modes::{Mode, ModeId};
use crate::monitor::Rotation;

pub type CrtcId = u32;
pub type OutputId = u32;

/// Allowed virtual canvas size reported by the display server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min_width: i32,
    pub max_width: i32,
    pub min_height: i32,
    pub max_height: i32,
}

impl SizeRange {
    pub fn min_pixels(&self) -> i64 {
        self.min_width as i64 * self.min_height as i64
    }

    pub fn max_pixels(&self) -> i64 {
        self.max_width as i64 * self.max_height as i64
    }

    /// Clamps each axis into the range independently.
    pub fn clamp(&self, width: i32, height: i32) -> (i32, i32) {
        (
            width.max(self.min_width).min(self.max_width),
            height.max(self.min_height).min(self.max_height),
        )
    }
}

/// EDID derived identity of the monitor behind an output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonitorIdentity {
    pub vendor: String,
    pub product: u16,
    pub serial: u32,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputResource {
    pub id: OutputId,
    pub name: String,
    pub connected: bool,
    pub identity: Option<MonitorIdentity>,
    pub current_crtc: Option<CrtcId>,
    pub possible_crtcs: Vec<CrtcId>,
    /// Outputs this one may share a CRTC with.
    pub clones: Vec<OutputId>,
    pub modes: Vec<ModeId>,
    /// Index into `modes` of the preferred entry, if any.
    pub preferred_mode: Option<usize>,
    pub primary: bool,
}

impl OutputResource {
    pub fn supports_mode(&self, mode: ModeId) -> bool {
        self.modes.contains(&mode)
    }

    pub fn can_clone(&self, other: OutputId) -> bool {
        self.clones.contains(&other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrtcResource {
    pub id: CrtcId,
    pub current_mode: Option<ModeId>,
    pub x: i32,
    pub y: i32,
    pub current_rotation: Rotation,
    pub rotations: Rotation,
    pub possible_outputs: Vec<OutputId>,
}

impl CrtcResource {
    pub fn can_drive_output(&self, output: OutputId) -> bool {
        self.possible_outputs.contains(&output)
    }

    /// Any overlap with the supported set is enough.
    pub fn supports_rotation(&self, rotation: Rotation) -> bool {
        self.rotations.intersects(rotation)
    }
}

/// Read-only snapshot of what the display server can do right now.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenResources {
    pub crtcs: Vec<CrtcResource>,
    pub outputs: Vec<OutputResource>,
    pub modes: Vec<Mode>,
    pub range: SizeRange,
}

impl ScreenResources {
    pub fn new(range: SizeRange) -> ScreenResources {
        ScreenResources {
            crtcs: Vec::new(),
            outputs: Vec::new(),
            modes: Vec::new(),
            range,
        }
    }

    pub fn mode(&self, id: ModeId) -> Option<&Mode> {
        self.modes.iter().find(|m| m.id == id)
    }

    pub fn crtc(&self, id: CrtcId) -> Option<&CrtcResource> {
        self.crtcs.iter().find(|c| c.id == id)
    }

    pub fn output(&self, id: OutputId) -> Option<&OutputResource> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&OutputResource> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Modes of `output` in the order the server listed them.
    pub fn output_modes<'a>(&'a self, output: &'a OutputResource) -> impl Iterator<Item = &'a Mode> {
        output.modes.iter().filter_map(move |id| self.mode(*id))
    }

    /// Mode currently scanned out by the CRTC driving `output`.
    pub fn current_mode(&self, output: &OutputResource) -> Option<(&CrtcResource, &Mode)> {
        let crtc = self.crtc(output.current_crtc?)?;
        let mode = self.mode(crtc.current_mode?)?;
        Some((crtc, mode))
    }

    pub fn preferred_mode(&self, output: &OutputResource) -> Option<&Mode> {
        output
            .preferred_mode
            .and_then(|index| output.modes.get(index))
            .and_then(|id| self.mode(*id))
    }
}
