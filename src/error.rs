use thiserror::Error;

use crate::backend::BackendError;
use crate::resources::CrtcId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The monitors file could not be parsed as XML.
    #[error("malformed monitor configuration file: {0}")]
    MalformedPersistedFile(String),

    /// Not a failure as such: nothing stored applies to the current hardware.
    #[error("none of the saved display configurations matched the active configuration")]
    NoMatchingStoredConfiguration,

    #[error("could not find a suitable configuration of screens")]
    Unsatisfiable,

    #[error(
        "required virtual size does not fit available size: \
         requested=({requested_width}, {requested_height}), \
         minimum=({min_width}, {min_height}), maximum=({max_width}, {max_height})"
    )]
    BoundsExceeded {
        requested_width: i32,
        requested_height: i32,
        min_width: i32,
        min_height: i32,
        max_width: i32,
        max_height: i32,
    },

    #[error("failed to configure CRTC {crtc}: {reason}")]
    HardwareConfigureFailed { crtc: CrtcId, reason: BackendError },

    #[error("display server request failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("dbus: {0}")]
    Bus(#[from] zbus::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::MalformedPersistedFile(err.to_string())
    }
}

impl Error {
    /// True for outcomes that mean "leave the hardware as it is".
    pub fn is_no_match(&self) -> bool {
        match self {
            Error::NoMatchingStoredConfiguration => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
