//! Protocol module - TDS packet format, framing and MARS headers.
//!
//! This module implements the binary protocol below the token stream:
//! - 8-byte packet header encoding/decoding
//! - Packet buffer for accumulating partial reads, message reassembly
//! - Splitting outbound messages into packets
//! - 16-byte SMP header for multiplexed (MARS) sessions

mod packet;
mod packet_buffer;
mod smp;
mod wire_format;

pub use packet::{next_packet_id, split_message, Message, Packet};
pub use packet_buffer::{MessageAssembler, PacketBuffer};
pub use smp::{smp_flags, SmpHeader, DEFAULT_SMP_WINDOW, SMID, SMP_HEADER_SIZE};
pub use wire_format::{
    clamp_packet_size, packet_type, status, PacketHeader, DEFAULT_PACKET_SIZE, HEADER_SIZE,
    MAX_PACKET_SIZE, MIN_PACKET_SIZE,
};
