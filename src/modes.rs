use crate::monitor::Rotation;

pub type ModeId = u32;

/// A scanout timing an output can be driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    pub id: ModeId,
    pub width: i32,
    pub height: i32,
    /// Vertical refresh in whole Hz.
    pub rate: i32,
}

impl Mode {
    pub fn new(id: ModeId, width: i32, height: i32, rate: i32) -> Mode {
        Mode {
            id,
            width,
            height,
            rate,
        }
    }

    /// Rounds a refresh rate given in mHz to whole Hz.
    pub fn rate_from_millihertz(millihertz: i32) -> i32 {
        (millihertz + 500) / 1000
    }

    pub fn has_size(&self, width: i32, height: i32) -> bool {
        self.width == width && self.height == height
    }

    /// Footprint of the mode on the canvas once `rotation` is applied.
    pub fn rotated_size(&self, rotation: Rotation) -> (i32, i32) {
        if rotation.is_rotated() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn get_modestr(&self) -> String {
        format!("{}x{}@{}Hz", self.width, self.height, self.rate)
    }
}
