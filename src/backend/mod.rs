pub mod sway;

use thiserror::Error;

use crate::modes::ModeId;
use crate::monitor::Rotation;
use crate::resources::{CrtcId, OutputId, ScreenResources};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("sway ipc: {0}")]
    Sway(#[from] swayipc_async::Error),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unknown {kind} {id}")]
    Unknown { kind: &'static str, id: u32 },
}

/// Everything needed to reprogram one CRTC. A `mode` of `None` switches the
/// CRTC off, in which case `outputs` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CrtcConfig<'a> {
    pub crtc: CrtcId,
    /// Change token; the display server rejects requests older than its
    /// last configuration.
    pub timestamp: u32,
    pub x: i32,
    pub y: i32,
    pub mode: Option<ModeId>,
    pub rotation: Rotation,
    pub outputs: &'a [OutputId],
}

impl CrtcConfig<'_> {
    pub fn off(crtc: CrtcId, timestamp: u32) -> CrtcConfig<'static> {
        CrtcConfig {
            crtc,
            timestamp,
            x: 0,
            y: 0,
            mode: None,
            rotation: Rotation::ROTATE_0,
            outputs: &[],
        }
    }
}

/// The display server side: hardware queries and configuration requests.
///
/// All calls block until the server has answered.
pub trait DisplayBackend: Send {
    /// Re-reads outputs, CRTCs and modes.
    fn screen_resources(&mut self) -> Result<ScreenResources, BackendError>;

    /// Resizes the virtual canvas, in pixels and millimetres.
    fn set_screen_size(&mut self, width: i32, height: i32, width_mm: i32, height_mm: i32) -> Result<(), BackendError>;

    fn set_crtc_config(&mut self, config: &CrtcConfig<'_>) -> Result<(), BackendError>;

    /// Hint only; servers without a notion of primary output may ignore it.
    fn set_primary_output(&mut self, output: Option<OutputId>) -> Result<(), BackendError>;
}
