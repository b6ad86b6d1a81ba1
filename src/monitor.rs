use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

bitflags! {
    /// Rotation and reflection of a CRTC, as RandR encodes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rotation: u32 {
        const ROTATE_0 = 1 << 0;
        const ROTATE_90 = 1 << 1;
        const ROTATE_180 = 1 << 2;
        const ROTATE_270 = 1 << 3;
        const REFLECT_X = 1 << 4;
        const REFLECT_Y = 1 << 5;
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::ROTATE_0
    }
}

impl Rotation {
    /// True when the mode's width and height trade places on the canvas.
    pub fn is_rotated(self) -> bool {
        self.intersects(Rotation::ROTATE_90 | Rotation::ROTATE_270)
    }

    /// Name used in the monitors file. The first set quarter-turn wins.
    pub fn name(self) -> &'static str {
        if self.contains(Rotation::ROTATE_0) {
            "normal"
        } else if self.contains(Rotation::ROTATE_90) {
            "left"
        } else if self.contains(Rotation::ROTATE_180) {
            "upside_down"
        } else if self.contains(Rotation::ROTATE_270) {
            "right"
        } else {
            "normal"
        }
    }

    pub fn from_xml_name(name: &str) -> Option<Rotation> {
        match name {
            "normal" => Some(Rotation::ROTATE_0),
            "left" => Some(Rotation::ROTATE_90),
            "upside_down" => Some(Rotation::ROTATE_180),
            "right" => Some(Rotation::ROTATE_270),
            _ => None,
        }
    }

    fn quarter_turns(self) -> u32 {
        if self.contains(Rotation::ROTATE_90) {
            1
        } else if self.contains(Rotation::ROTATE_180) {
            2
        } else if self.contains(Rotation::ROTATE_270) {
            3
        } else {
            0
        }
    }

    fn from_quarter_turns(turns: u32) -> Rotation {
        match turns % 4 {
            1 => Rotation::ROTATE_90,
            2 => Rotation::ROTATE_180,
            3 => Rotation::ROTATE_270,
            _ => Rotation::ROTATE_0,
        }
    }
}

/// Compact rotation form used on the bus (counter-clockwise quarter turns,
/// plus 4 when mirrored around the vertical axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum MonitorTransform {
    Normal = 0,
    Left = 1,
    Down = 2,
    Right = 3,
    Flipped = 4,
    FlippedLeft = 5,
    FlippedDown = 6,
    FlippedRight = 7,
}

impl From<Rotation> for MonitorTransform {
    fn from(rotation: Rotation) -> Self {
        let mut turns = rotation.quarter_turns();
        // A vertical mirror is a horizontal one turned upside down.
        if rotation.contains(Rotation::REFLECT_Y) {
            turns += 2;
        }
        let flipped = rotation.contains(Rotation::REFLECT_X) ^ rotation.contains(Rotation::REFLECT_Y);
        match (turns % 4, flipped) {
            (0, false) => MonitorTransform::Normal,
            (1, false) => MonitorTransform::Left,
            (2, false) => MonitorTransform::Down,
            (3, false) => MonitorTransform::Right,
            (0, true) => MonitorTransform::Flipped,
            (1, true) => MonitorTransform::FlippedLeft,
            (2, true) => MonitorTransform::FlippedDown,
            _ => MonitorTransform::FlippedRight,
        }
    }
}

impl From<MonitorTransform> for Rotation {
    fn from(transform: MonitorTransform) -> Self {
        let raw = transform as u32;
        let rotation = Rotation::from_quarter_turns(raw % 4);
        if raw >= 4 {
            rotation | Rotation::REFLECT_X
        } else {
            rotation
        }
    }
}

/// Desired state of one output within a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub connected: bool,
    pub on: bool,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub rate: i32,
    pub rotation: Rotation,
    pub primary: bool,
    pub pref_width: i32,
    pub pref_height: i32,
    /// Three letter PNP manufacturer code, empty when unknown.
    pub vendor: String,
    pub product: u16,
    pub serial: u32,
}

impl OutputInfo {
    /// A disconnected, disabled output with placeholder geometry.
    pub fn new(name: impl Into<String>) -> OutputInfo {
        OutputInfo {
            name: name.into(),
            display_name: None,
            connected: false,
            on: false,
            x: -1,
            y: -1,
            width: -1,
            height: -1,
            rate: -1,
            rotation: Rotation::ROTATE_0,
            primary: false,
            pref_width: 0,
            pref_height: 0,
            vendor: String::new(),
            product: 0,
            serial: 0,
        }
    }

    /// Same physical connector with the same monitor plugged in.
    pub fn matches(&self, other: &OutputInfo) -> bool {
        self.name == other.name
            && self.vendor == other.vendor
            && self.product == other.product
            && self.serial == other.serial
            && self.connected == other.connected
    }

    /// Matches and would end up scanning out the same picture.
    pub fn equivalent(&self, other: &OutputInfo) -> bool {
        if !self.matches(other) || self.on != other.on {
            return false;
        }
        !self.on
            || (self.width == other.width
                && self.height == other.height
                && self.rate == other.rate
                && self.x == other.x
                && self.y == other.y
                && self.rotation == other.rotation)
    }

    /// Canvas extent once rotated; `None` while the output is off.
    pub fn rotated_size(&self) -> Option<(i32, i32)> {
        if !self.on {
            return None;
        }
        if self.rotation.is_rotated() {
            Some((self.height, self.width))
        } else {
            Some((self.width, self.height))
        }
    }
}
