//! Protocol implementations.

pub mod frame;

// Re-export common types
pub use frame::{
    DataPacket, DeviceInfo, Opcode, PACKET_PAYLOAD_SIZE, ReadyStatus, RequestFrame,
    is_button_event,
};
