use std::net::UdpSocket;

use super::{NetworkAddress, NetworkError, NetworkTransport};

/// UDP-based network transport
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    client_addr: NetworkAddress,
    bind_addr: String,
}

impl UdpTransport {
    pub fn new(client_addr: NetworkAddress, bind_addr: String) -> Self {
        Self { socket: None, client_addr, bind_addr }
    }

    /// Address the socket is bound to, once connected
    pub fn local_port(&self) -> Option<u16> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok()).map(|a| a.port())
    }

    fn ensure_connected(&mut self) -> Result<(), NetworkError> {
        if self.socket.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    fn get_udp_addr(&self) -> String {
        match &self.client_addr {
            NetworkAddress::Udp { host, port } => format!("{}:{}", host, port),
        }
    }
}

impl NetworkTransport for UdpTransport {
    fn connect(&mut self) -> Result<(), NetworkError> {
        match UdpSocket::bind(&self.bind_addr) {
            Ok(socket) => {
                tracing::debug!("connect: bound {} for {}", self.bind_addr, self.get_udp_addr());
                self.socket = Some(socket);
                Ok(())
            }
            Err(e) => Err(NetworkError::ConnectionFailed(format!("UDP bind {} failed: {}", self.bind_addr, e))),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn send_unreliable(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        self.ensure_connected()?;
        let addr = self.get_udp_addr();
        let Some(ref socket) = self.socket else {
            return Err(NetworkError::SendFailed("No active socket".to_string()));
        };
        let sent = socket
            .send_to(payload, &addr)
            .map_err(|e| NetworkError::SendFailed(format!("UDP send to {} failed: {}", addr, e)))?;
        if sent != payload.len() {
            return Err(NetworkError::ShortSend { expected: payload.len(), sent });
        }
        Ok(())
    }
}
