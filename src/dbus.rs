use std::sync::Arc;

use log::{info, warn};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zbus::{dbus_interface, fdo, ConnectionBuilder, SignalContext};
use zvariant::Type;

use crate::config::Configuration;
use crate::error::Error;
use crate::monitor::{MonitorTransform, OutputInfo};
use crate::DisplayManager;

pub const BUS_NAME: &str = "org.regolith.DisplayLayout";
pub const OBJECT_PATH: &str = "/org/regolith/DisplayLayout";
pub const INTERFACE_NAME: &str = "org.regolith.DisplayLayout";

/// One output as clients see it on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
pub struct OutputState {
    pub name: String,
    pub display_name: String,
    pub connected: bool,
    pub on: bool,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub rate: i32,
    /// [`MonitorTransform`] value.
    pub transform: u32,
    pub primary: bool,
    pub vendor: String,
    pub product: u16,
    pub serial: u32,
}

impl From<&OutputInfo> for OutputState {
    fn from(output: &OutputInfo) -> Self {
        OutputState {
            name: output.name.clone(),
            display_name: output.display_name.clone().unwrap_or_default(),
            connected: output.connected,
            on: output.on,
            x: output.x,
            y: output.y,
            width: output.width,
            height: output.height,
            rate: output.rate,
            transform: MonitorTransform::from(output.rotation).to_u32().unwrap_or_default(),
            primary: output.primary,
            vendor: output.vendor.clone(),
            product: output.product,
            serial: output.serial,
        }
    }
}

impl TryFrom<OutputState> for OutputInfo {
    type Error = fdo::Error;

    fn try_from(state: OutputState) -> Result<Self, Self::Error> {
        let transform = MonitorTransform::from_u32(state.transform)
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("invalid transform {}", state.transform)))?;
        if state.on && !state.connected {
            return Err(fdo::Error::InvalidArgs(format!(
                "output {} cannot be on while disconnected",
                state.name
            )));
        }
        Ok(OutputInfo {
            display_name: Some(state.display_name).filter(|name| !name.is_empty()),
            connected: state.connected,
            on: state.on,
            x: state.x,
            y: state.y,
            width: state.width,
            height: state.height,
            rate: state.rate,
            rotation: transform.into(),
            primary: state.primary,
            vendor: state.vendor,
            product: state.product,
            serial: state.serial,
            ..OutputInfo::new(state.name)
        })
    }
}

impl From<Error> for fdo::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Unsatisfiable | Error::BoundsExceeded { .. } => fdo::Error::InvalidArgs(err.to_string()),
            Error::NoMatchingStoredConfiguration => fdo::Error::FileNotFound(err.to_string()),
            err => fdo::Error::Failed(err.to_string()),
        }
    }
}

/// DBus Interface for providing bindings
pub struct DisplayServer {
    manager: Arc<Mutex<DisplayManager>>,
}

#[dbus_interface(name = "org.regolith.DisplayLayout")]
impl DisplayServer {
    #[dbus_interface(out_args("serial", "clone", "outputs"))]
    pub async fn get_current_state(&self) -> fdo::Result<(u32, bool, Vec<OutputState>)> {
        info!("Received 'GetCurrentState' request");
        let mut manager = self.manager.lock().await;
        manager.refresh()?;
        let config = manager.current_configuration()?;
        let outputs = config.outputs.iter().map(OutputState::from).collect();
        Ok((manager.serial(), config.clone, outputs))
    }

    pub async fn apply_configuration(
        &self,
        serial: u32,
        clone: bool,
        outputs: Vec<OutputState>,
        persistent: bool,
        #[zbus(signal_context)] ctxt: SignalContext<'_>,
    ) -> fdo::Result<()> {
        info!("Received 'ApplyConfiguration' request (serial {serial}, persistent {persistent})");
        let outputs = outputs
            .into_iter()
            .map(OutputInfo::try_from)
            .collect::<fdo::Result<Vec<_>>>()?;
        {
            let mut manager = self.manager.lock().await;
            if serial != manager.serial() {
                warn!("rejecting configuration for stale serial {serial}");
                return Err(fdo::Error::InvalidArgs(format!(
                    "stale serial {serial}, current is {}",
                    manager.serial()
                )));
            }
            manager.apply_configuration(Configuration::new(clone, outputs), persistent)?;
        }
        Self::monitors_changed(&ctxt).await?;
        Ok(())
    }

    pub async fn apply_stored_configuration(&self, #[zbus(signal_context)] ctxt: SignalContext<'_>) -> fdo::Result<()> {
        info!("Received 'ApplyStoredConfiguration' request");
        self.manager.lock().await.apply_stored()?;
        Self::monitors_changed(&ctxt).await?;
        Ok(())
    }

    #[dbus_interface(signal)]
    pub async fn monitors_changed(ctxt: &SignalContext<'_>) -> zbus::Result<()>;
}

impl DisplayServer {
    pub fn new(manager: Arc<Mutex<DisplayManager>>) -> DisplayServer {
        DisplayServer { manager }
    }

    pub async fn run_server(self) -> crate::Result<zbus::Connection> {
        info!("Starting display daemon");
        self.manager.lock().await.refresh()?;
        let connection = ConnectionBuilder::session()?
            .name(BUS_NAME)?
            .serve_at(OBJECT_PATH, self)?
            .build()
            .await?;
        Ok(connection)
    }
}
