//! Datagram ingestion: decode metric lines and forward them to the store

mod parser;
mod server;

pub use parser::{parse_packet, ParsedPacket};
pub use server::{CollectionServer, BAD_LINES_SEEN, DEFAULT_MAX_PACKET_SIZE, PACKETS_RECEIVED};
