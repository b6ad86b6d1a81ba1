//! [`DisplayBackend`] on top of sway's IPC socket.
//!
//! Sway does not expose CRTCs, so every output is reported with a CRTC of
//! its own carrying the same id. Outputs never share a CRTC, which means
//! clone layouts are realised as separate CRTCs at the same position.

use std::future::Future;

use log::{debug, info};
use swayipc_async::{Connection, Mode as SwayMode, Output};
use tokio::runtime::Handle;

use super::{BackendError, CrtcConfig, DisplayBackend};
use crate::modes::{Mode, ModeId};
use crate::monitor::{MonitorTransform, Rotation};
use crate::resources::{CrtcResource, MonitorIdentity, OutputId, OutputResource, ScreenResources, SizeRange};

/// Largest canvas sway accepts in either direction.
const CANVAS_LIMIT: i32 = 16384;

pub struct SwayBackend {
    connection: Connection,
    runtime: Handle,
    /// Output names, indexed by output id.
    names: Vec<String>,
    /// Exact sway modes (refresh in mHz), indexed by mode id - 1.
    modes: Vec<SwayMode>,
}

/// Runs an IPC future to completion from synchronous code living on a
/// multi-threaded runtime.
fn block_on<F: Future>(runtime: &Handle, future: F) -> F::Output {
    tokio::task::block_in_place(|| runtime.block_on(future))
}

impl SwayBackend {
    pub async fn connect() -> Result<SwayBackend, BackendError> {
        let connection = Connection::new().await?;
        Ok(SwayBackend {
            connection,
            runtime: Handle::current(),
            names: Vec::new(),
            modes: Vec::new(),
        })
    }

    fn intern_mode(&mut self, mode: &SwayMode) -> ModeId {
        let index = match self.modes.iter().position(|m| is_same_mode(m, mode)) {
            Some(index) => index,
            None => {
                self.modes.push(mode.clone());
                self.modes.len() - 1
            }
        };
        index as ModeId + 1
    }

    fn output_name(&self, id: OutputId) -> Result<&str, BackendError> {
        self.names
            .get(id as usize)
            .map(String::as_str)
            .ok_or(BackendError::Unknown { kind: "output", id })
    }

    fn mode_command(&self, id: ModeId) -> Result<String, BackendError> {
        let mode = (id as usize)
            .checked_sub(1)
            .and_then(|index| self.modes.get(index))
            .ok_or(BackendError::Unknown { kind: "mode", id })?;
        Ok(format!(
            "{}x{}@{}.{:03}Hz",
            mode.width,
            mode.height,
            mode.refresh / 1000,
            mode.refresh % 1000
        ))
    }

    fn run_command(&mut self, command: String) -> Result<(), BackendError> {
        info!("sway: {command}");
        let outcomes = block_on(&self.runtime, self.connection.run_command(command))?;
        let failures: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BackendError::Rejected(failures.join("; ")))
        }
    }
}

fn is_same_mode(a: &SwayMode, b: &SwayMode) -> bool {
    a.width == b.width && a.height == b.height && a.refresh == b.refresh
}

/// Folds free-form EDID strings sway reports into a numeric id.
fn fold_id(text: &str) -> u32 {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    };
    parsed.unwrap_or_else(|| {
        // FNV-1a
        text.bytes()
            .fold(0x811c_9dc5u32, |hash, b| (hash ^ b as u32).wrapping_mul(0x0100_0193))
    })
}

fn identity(output: &Output) -> MonitorIdentity {
    MonitorIdentity {
        vendor: output.make.chars().take(3).collect(),
        product: fold_id(&output.model) as u16,
        serial: fold_id(&output.serial),
        model: Some(format!("{} {}", output.make, output.model).trim().to_string()),
    }
}

/// Sway rotates clockwise, RandR counter-clockwise.
fn sway_transform(rotation: Rotation) -> &'static str {
    match MonitorTransform::from(rotation) {
        MonitorTransform::Normal => "normal",
        MonitorTransform::Left => "270",
        MonitorTransform::Down => "180",
        MonitorTransform::Right => "90",
        MonitorTransform::Flipped => "flipped",
        MonitorTransform::FlippedLeft => "flipped-270",
        MonitorTransform::FlippedDown => "flipped-180",
        MonitorTransform::FlippedRight => "flipped-90",
    }
}

fn rotation_from_sway(transform: Option<&str>) -> Rotation {
    let transform = match transform.unwrap_or("normal") {
        "270" => MonitorTransform::Left,
        "180" => MonitorTransform::Down,
        "90" => MonitorTransform::Right,
        "flipped" => MonitorTransform::Flipped,
        "flipped-270" => MonitorTransform::FlippedLeft,
        "flipped-180" => MonitorTransform::FlippedDown,
        "flipped-90" => MonitorTransform::FlippedRight,
        _ => MonitorTransform::Normal,
    };
    transform.into()
}

impl DisplayBackend for SwayBackend {
    fn screen_resources(&mut self) -> Result<ScreenResources, BackendError> {
        let outputs = block_on(&self.runtime, self.connection.get_outputs())?;
        self.names.clear();
        self.modes.clear();

        let mut screen = ScreenResources::new(SizeRange {
            min_width: 1,
            max_width: CANVAS_LIMIT,
            min_height: 1,
            max_height: CANVAS_LIMIT,
        });

        for (index, output) in outputs.iter().enumerate() {
            let id = index as OutputId;
            let modes: Vec<ModeId> = output.modes.iter().map(|m| self.intern_mode(m)).collect();
            let current = match (&output.current_mode, output.active) {
                (Some(mode), true) => Some(self.intern_mode(mode)),
                _ => None,
            };

            screen.outputs.push(OutputResource {
                id,
                name: output.name.clone(),
                connected: true,
                identity: Some(identity(output)),
                current_crtc: current.map(|_| id),
                possible_crtcs: vec![id],
                clones: Vec::new(),
                modes,
                preferred_mode: None,
                primary: output.primary,
            });
            screen.crtcs.push(CrtcResource {
                id,
                current_mode: current,
                x: output.rect.x,
                y: output.rect.y,
                current_rotation: rotation_from_sway(output.transform.as_deref()),
                rotations: Rotation::all(),
                possible_outputs: vec![id],
            });
            self.names.push(output.name.clone());
        }

        screen.modes = self
            .modes
            .iter()
            .enumerate()
            .map(|(index, m)| {
                Mode::new(index as ModeId + 1, m.width, m.height, Mode::rate_from_millihertz(m.refresh))
            })
            .collect();

        debug!("sway screen resources: {screen:#?}");
        Ok(screen)
    }

    fn set_screen_size(&mut self, width: i32, height: i32, width_mm: i32, height_mm: i32) -> Result<(), BackendError> {
        // Sway sizes its layout from the outputs it drives.
        debug!("ignoring canvas size {width}x{height} ({width_mm}x{height_mm} mm)");
        Ok(())
    }

    fn set_crtc_config(&mut self, config: &CrtcConfig<'_>) -> Result<(), BackendError> {
        // A CRTC drives the output sharing its id and nothing else.
        let name = self.output_name(config.crtc)?.to_string();
        let command = match config.mode {
            None => format!("output \"{name}\" disable"),
            Some(mode) => format!(
                "output \"{name}\" enable mode {} position {} {} transform {}",
                self.mode_command(mode)?,
                config.x,
                config.y,
                sway_transform(config.rotation)
            ),
        };
        self.run_command(command)
    }

    fn set_primary_output(&mut self, output: Option<OutputId>) -> Result<(), BackendError> {
        debug!("sway has no primary output, ignoring {output:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transforms_round_trip_through_sway_names() {
        for transform in [
            Rotation::ROTATE_0,
            Rotation::ROTATE_90,
            Rotation::ROTATE_180,
            Rotation::ROTATE_270,
            Rotation::ROTATE_0 | Rotation::REFLECT_X,
            Rotation::ROTATE_90 | Rotation::REFLECT_X,
        ] {
            assert_eq!(rotation_from_sway(Some(sway_transform(transform))), transform);
        }
        assert_eq!(sway_transform(Rotation::ROTATE_90), "270");
        assert_eq!(rotation_from_sway(None), Rotation::ROTATE_0);
    }

    #[test]
    fn edid_strings_fold_to_stable_ids() {
        assert_eq!(fold_id("0x4035"), 0x4035);
        assert_eq!(fold_id("12345"), 12345);
        assert_eq!(fold_id("DELL U2415"), fold_id("DELL U2415"));
        assert_ne!(fold_id("DELL U2415"), fold_id("DELL U2417"));
    }
}
