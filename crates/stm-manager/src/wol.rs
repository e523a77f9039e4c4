//! Wake-on-LAN magic packets

use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;

use stm_core::types::MacAddress;

/// Discard port, where magic packets are conventionally sent
pub const WOL_PORT: u16 = 9;

/// Length of a magic packet: 6 sync bytes and 16 copies of the address
pub const MAGIC_PACKET_LEN: usize = 102;

/// Errors related to Wake-on-LAN
#[derive(Debug, Error)]
pub enum WolError {
    #[error("Failed to create UDP socket: {0}")]
    Socket(std::io::Error),

    #[error("Failed to enable broadcast: {0}")]
    Broadcast(std::io::Error),

    #[error("Failed to send magic packet: {0}")]
    Send(std::io::Error),
}

/// Build the magic packet for an address
pub fn magic_packet(mac: &MacAddress) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFF; MAGIC_PACKET_LEN];
    for copy in packet[6..].chunks_exact_mut(6) {
        copy.copy_from_slice(mac.bytes());
    }
    packet
}

/// Broadcast the magic packet on the local network. Nothing is received back.
pub async fn send_magic_packet(mac: &MacAddress) -> Result<(), WolError> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .await
        .map_err(WolError::Socket)?;
    socket.set_broadcast(true).map_err(WolError::Broadcast)?;

    let target = SocketAddr::from((Ipv4Addr::BROADCAST, WOL_PORT));
    socket
        .send_to(&magic_packet(mac), target)
        .await
        .map_err(WolError::Send)?;

    tracing::debug!("Sent magic packet for {} to {}", mac, target);
    Ok(())
}
