use thiserror::Error;

/// Websocket frame level protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Received an unmasked frame from client
    #[error("Received an unmasked frame from client")]
    UnmaskedFrame,
    /// Received a masked frame from server
    #[error("Received a masked frame from server")]
    MaskedFrame,
    /// Encountered invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),
    /// Invalid control frame length
    #[error("Invalid control frame length: {0}")]
    InvalidLength(usize),
    /// Control frame without fin bit
    #[error("Fragmented control frame")]
    FragmentedControl,
    /// Reserved bits are set but no extension was negotiated
    #[error("Reserved bits are set")]
    ReservedBits,
    /// A payload reached size limit.
    #[error("A payload reached size limit.")]
    Overflow,
}
