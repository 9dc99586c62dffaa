use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{NetworkError, Result};

/// Read/write socket buffer size applied to listeners by default.
pub const DEFAULT_RW_BUFFER_SIZE: usize = 64 * 1024;
/// Pending connection queue length passed to `listen(2)`.
pub const DEFAULT_BACKLOG: i32 = 8;

/// Configuration for a single listening server.
///
/// Controls where the listener binds and how its sockets are sized. Use
/// ServerConfig::builder() for ergonomic construction.
///
/// ## Socket Options
///
/// - rw_buffer_size: applied to both SO_SNDBUF and SO_RCVBUF of the listener
///   (accepted sockets inherit it), and used as the per-read scratch size
/// - backlog: listen queue length
/// - no_delay: TCP_NODELAY on accepted connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address to bind to
    pub ip: IpAddr,
    /// Port to bind to, 0 for an ephemeral port
    pub port: u16,
    /// Send and receive buffer size
    pub rw_buffer_size: usize,
    /// Listen backlog
    pub backlog: i32,
    /// Enable TCP_NODELAY on accepted connections
    pub no_delay: bool,
}

impl ServerConfig {
    /// Create a new builder for ServerConfig
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Builds a config from a textual ip. An empty string binds every interface.
    pub fn from_ip(ip: &str, port: u16, rw_buffer_size: usize) -> Result<Self> {
        Ok(Self::builder()
            .ip(parse_ip(ip)?)
            .port(port)
            .rw_buffer_size(rw_buffer_size)
            .build())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            rw_buffer_size: DEFAULT_RW_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            no_delay: true,
        }
    }
}

fn parse_ip(ip: &str) -> Result<IpAddr> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    ip.parse()
        .map_err(|_| NetworkError::InvalidAddress(ip.to_string()))
}

/// Builder for ServerConfig using the builder pattern.
///
/// All fields are optional and will use defaults from ServerConfig::default()
/// if not explicitly set.
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    ip: Option<IpAddr>,
    port: Option<u16>,
    rw_buffer_size: Option<usize>,
    backlog: Option<i32>,
    no_delay: Option<bool>,
}

impl ServerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ip to bind to
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the port to bind to
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set ip and port at once
    pub fn address(self, addr: SocketAddr) -> Self {
        self.ip(addr.ip()).port(addr.port())
    }

    /// Set the send/receive buffer size
    pub fn rw_buffer_size(mut self, size: usize) -> Self {
        self.rw_buffer_size = Some(size);
        self
    }

    /// Set the listen backlog
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    /// Build the ServerConfig
    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            ip: self.ip.unwrap_or(default.ip),
            port: self.port.unwrap_or(default.port),
            rw_buffer_size: self.rw_buffer_size.unwrap_or(default.rw_buffer_size).max(1),
            backlog: self.backlog.unwrap_or(default.backlog),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
        }
    }
}
