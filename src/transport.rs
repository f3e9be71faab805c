//! UDP transport: socket ownership, IP discovery, and the send/receive
//! halves of the audio datagram path (§4.2).

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

const DISCOVERY_REQUEST_LEN: usize = 74;
const DISCOVERY_TYPE_REQUEST: u16 = 0x1;
const DISCOVERY_TYPE_RESPONSE: u16 = 0x2;
const DISCOVERY_LENGTH_FIELD: u16 = 70;
const DISCOVERY_ADDRESS_LEN: usize = 64;

/// An 8-byte keepalive datagram, sent periodically to keep NAT bindings
/// open while no audio is flowing (§4.2).
pub const KEEPALIVE_PACKET: [u8; 8] = [0u8; 8];

/// Owns a connected UDP socket to the voice server and implements the IP
/// discovery handshake, audio send, and audio receive.
///
/// A single send and a single receive task are expected to drive this type
/// concurrently from the supervisor's actor loop; both halves share the
/// same connected socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local socket and connects it to the voice
    /// server's `(ip, port)`.
    pub async fn connect(server_ip: IpAddr, server_port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(SocketAddr::new(server_ip, server_port)).await?;
        Ok(Self { socket })
    }

    /// Runs the IP discovery handshake (§4.2) and returns the externally
    /// observed `(ip, port)` for this socket.
    pub async fn discover_external_address(&self, ssrc: u32) -> Result<(IpAddr, u16)> {
        let mut request = [0u8; DISCOVERY_REQUEST_LEN];
        BigEndian::write_u16(&mut request[0..2], DISCOVERY_TYPE_REQUEST);
        BigEndian::write_u16(&mut request[2..4], DISCOVERY_LENGTH_FIELD);
        BigEndian::write_u32(&mut request[4..8], ssrc);
        // Bytes [8..74) are the zeroed address/port placeholder.

        self.socket.send(&request).await?;

        let mut response = [0u8; DISCOVERY_REQUEST_LEN];
        let len = self.socket.recv(&mut response).await?;
        parse_discovery_response(&response[..len])
    }

    /// Sends one pre-framed audio datagram (already encoded by
    /// [`crate::crypto::RtpCodec`]).
    pub async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.socket.send(datagram).await?;
        Ok(())
    }

    /// Sends the fixed 8-byte keepalive datagram.
    pub async fn send_keepalive(&self) -> Result<()> {
        self.socket.send(&KEEPALIVE_PACKET).await?;
        Ok(())
    }

    /// Awaits the next inbound datagram from the connected peer.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.socket.recv(buf).await?)
    }
}

fn parse_discovery_response(bytes: &[u8]) -> Result<(IpAddr, u16)> {
    if bytes.len() != DISCOVERY_REQUEST_LEN {
        return Err(Error::IllegalDiscoveryResponse);
    }
    if BigEndian::read_u16(&bytes[0..2]) != DISCOVERY_TYPE_RESPONSE {
        return Err(Error::IllegalDiscoveryResponse);
    }

    let address_bytes = &bytes[8..8 + DISCOVERY_ADDRESS_LEN];
    let nul_index = address_bytes.iter().position(|&b| b == 0).ok_or(Error::IllegalIp)?;
    let address_str = std::str::from_utf8(&address_bytes[..nul_index]).map_err(|_| Error::IllegalIp)?;
    let address: IpAddr = address_str.parse().map_err(|_| Error::IllegalIp)?;

    let port = BigEndian::read_u16(&bytes[8 + DISCOVERY_ADDRESS_LEN..DISCOVERY_REQUEST_LEN]);

    Ok((address, port))
}

/// Builds a synthetic discovery response datagram, for tests and for
/// documenting the wire layout this module parses.
#[cfg(test)]
fn build_discovery_response(ssrc: u32, ip: &str, port: u16) -> [u8; DISCOVERY_REQUEST_LEN] {
    let mut bytes = [0u8; DISCOVERY_REQUEST_LEN];
    BigEndian::write_u16(&mut bytes[0..2], DISCOVERY_TYPE_RESPONSE);
    BigEndian::write_u16(&mut bytes[2..4], DISCOVERY_LENGTH_FIELD);
    BigEndian::write_u32(&mut bytes[4..8], ssrc);
    let ip_bytes = ip.as_bytes();
    bytes[8..8 + ip_bytes.len()].copy_from_slice(ip_bytes);
    BigEndian::write_u16(&mut bytes[8 + DISCOVERY_ADDRESS_LEN..], port);
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ip_and_port_trimming_nuls() {
        let packet = build_discovery_response(7, "1.2.3.4", 50000);
        let (ip, port) = parse_discovery_response(&packet).unwrap();
        assert_eq!(ip, "1.2.3.4".parse::<IpAddr>().unwrap());
        assert_eq!(port, 50000);
    }

    #[test]
    fn rejects_wrong_packet_type() {
        let mut packet = build_discovery_response(7, "1.2.3.4", 50000);
        BigEndian::write_u16(&mut packet[0..2], DISCOVERY_TYPE_REQUEST);
        assert!(matches!(
            parse_discovery_response(&packet),
            Err(Error::IllegalDiscoveryResponse)
        ));
    }

    #[test]
    fn rejects_short_packets() {
        assert!(matches!(
            parse_discovery_response(&[0u8; 10]),
            Err(Error::IllegalDiscoveryResponse)
        ));
    }

    #[tokio::test]
    async fn round_trips_discovery_over_loopback() {
        let server = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpTransport::connect(server_addr.ip(), server_addr.port()).await.unwrap();

        let server_task = tokio::spawn(async move {
            let mut buf = [0u8; DISCOVERY_REQUEST_LEN];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, DISCOVERY_REQUEST_LEN);
            assert_eq!(BigEndian::read_u32(&buf[4..8]), 99);
            let response = build_discovery_response(99, "10.0.0.1", 4242);
            server.send_to(&response, peer).await.unwrap();
        });

        let (ip, port) = client.discover_external_address(99).await.unwrap();
        assert_eq!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(port, 4242);

        server_task.await.unwrap();
    }
}
