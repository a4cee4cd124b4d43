use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use sip_core::{Endpoint, Reply, Transport};

const MAX_DATAGRAM: usize = 65_535;

/// Blocking UDP transport over one socket bound to an ephemeral port.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    rx_buf: Vec<u8>,
}

impl UdpTransport {
    pub fn open() -> io::Result<Self> {
        Self::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
    }

    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        log::debug!("UDP transport bound to {:?}", socket.local_addr());
        Ok(Self {
            socket,
            rx_buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    fn set_timeout(&self, timeout: Duration) -> bool {
        // A zero read timeout is rejected by the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        match self.socket.set_read_timeout(Some(timeout)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("set_read_timeout failed: {e}");
                false
            }
        }
    }

    /// One datagram, with `elapsed` measured from `started`.
    fn receive(&mut self, started: Instant) -> Option<Reply> {
        match self.socket.recv_from(&mut self.rx_buf) {
            Ok((len, from)) => Some(Reply {
                data: self.rx_buf[..len].to_vec(),
                peer_ip: from.ip().to_string(),
                peer_port: from.port(),
                elapsed: started.elapsed(),
            }),
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
            Err(e) => {
                log::warn!("receive failed: {e}");
                None
            }
        }
    }
}

impl Transport for UdpTransport {
    fn send_and_await_reply(
        &mut self,
        endpoint: &Endpoint,
        payload: &[u8],
        timeout: Duration,
    ) -> Option<Reply> {
        let Some(dst) = resolve_ipv4(endpoint) else {
            log::warn!("could not resolve {} to an IPv4 address", endpoint.host());
            return None;
        };

        if !self.set_timeout(timeout) {
            return None;
        }

        let started = Instant::now();
        match self.socket.send_to(payload, dst) {
            Ok(n) if n > 0 => {}
            Ok(_) => return None,
            Err(e) => {
                log::warn!("send to {dst} failed: {e}");
                return None;
            }
        }

        self.receive(started)
    }

    fn await_reply(&mut self, timeout: Duration) -> Option<Reply> {
        if !self.set_timeout(timeout) {
            return None;
        }
        self.receive(Instant::now())
    }
}

/// IPv4 literal first, then the first IPv4 address DNS returns.
fn resolve_ipv4(endpoint: &Endpoint) -> Option<SocketAddr> {
    if let Ok(ip) = endpoint.host().parse::<Ipv4Addr>() {
        return Some(SocketAddrV4::new(ip, endpoint.port()).into());
    }
    (endpoint.host(), endpoint.port())
        .to_socket_addrs()
        .ok()?
        .find(SocketAddr::is_ipv4)
}
