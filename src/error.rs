use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by arclight.
#[derive(Debug)]
pub enum Error {
    /// The frame stream's TCP listener could not be bound at startup.
    BindError(io::Error),
    /// A MIDI backend could not be initialized.
    MidiInitError(String),
    /// A named MIDI port was not found or refused the connection.
    MidiConnectError(String),
    /// The OSC receive socket could not be bound at startup.
    OscSocketError(io::Error),
    /// A mixer layer index outside the configured layer range.
    LayerNotFound(usize),
    /// A beam store slot outside the configured grid.
    StoreSlotNotFound { row: usize, column: usize },
    /// A frame failed to encode for the wire.
    EncodeError(String),
    /// A received frame or snapshot file failed to decode.
    DecodeError(String),
    /// A scene snapshot could not be written or read back.
    SnapshotError(String),
    IoError(io::Error),
    SendError,
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BindError(err) => write!(f, "Failed to bind frame stream listener: {err}"),
            Self::MidiInitError(str) => write!(f, "MIDI backend error: {str}"),
            Self::MidiConnectError(str) => write!(f, "MIDI connection error: {str}"),
            Self::OscSocketError(err) => write!(f, "Failed to bind OSC socket: {err}"),
            Self::LayerNotFound(index) => write!(f, "Mixer layer with index {index} not found"),
            Self::StoreSlotNotFound { row, column } => {
                write!(f, "Beam store slot at row {row}, column {column} not found")
            }
            Self::EncodeError(str) => write!(f, "Failed to encode frame: {str}"),
            Self::DecodeError(str) => write!(f, "Failed to decode: {str}"),
            Self::SnapshotError(str) => write!(f, "Snapshot error: {str}"),
            Self::IoError(err) => err.fmt(f),
            Self::SendError => write!(f, "Failed to send message into a channel"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Error::SendError
    }
}
