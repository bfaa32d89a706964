//! Connection acceptor: binds the port, screens peers, hands sockets to
//! the dispatcher one at a time.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};

use thiserror::Error;
use tracing::{info, warn};

use crate::children::ChildRegistry;
use crate::dispatcher::{self, ConnectionEnd};
use crate::platform;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Single allow-listed source host; None accepts any peer.
    pub srchost: Option<String>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to resolve '{host}': {source}")]
    Resolve { host: String, source: io::Error },
    #[error("'{host}' does not resolve to any address")]
    NoAddresses { host: String },
    #[error("unable to listen on port {port}: {source}")]
    Listen { port: u16, source: io::Error },
    #[error("unable to accept a connection: {0}")]
    Accept(io::Error),
}

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    children: ChildRegistry,
}

impl Server {
    /// Binds the listening socket. A configured source host must resolve
    /// at startup; later resolution failures only reject that connection.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        if let Some(host) = &config.srchost {
            resolve_host(host)?;
        }
        let listener = platform::listen(config.port).map_err(|source| ServerError::Listen {
            port: config.port,
            source,
        })?;
        let children = ChildRegistry::new();
        children.start_reaper();
        info!(port = config.port, "listening");
        Ok(Self {
            listener,
            config,
            children,
        })
    }

    /// The bound address; port 0 in the config gets the real port here.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves connections until an upgrade asks to quit.
    pub fn run(&self) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ServerError::Accept(err)),
            };
            if !self.peer_allowed(&peer) {
                info!(peer = %peer, "rejected connection from non-allowed host");
                continue;
            }
            match dispatcher::serve(stream, &self.children) {
                ConnectionEnd::Quit => {
                    info!("upgrade requested; leaving the accept loop");
                    return Ok(());
                }
                ConnectionEnd::Disconnected => {}
            }
        }
    }

    /// Exact-address allow-list check. The host is re-resolved on every
    /// connection so a DHCP lease change on the client does not wedge
    /// the daemon until restart.
    fn peer_allowed(&self, peer: &SocketAddr) -> bool {
        let Some(host) = &self.config.srchost else {
            return true;
        };
        match resolve_host(host) {
            Ok(addrs) => addrs.iter().any(|addr| *addr == peer.ip()),
            Err(err) => {
                warn!(host = %host, error = %err, "unable to re-resolve the allowed host");
                false
            }
        }
    }
}

fn resolve_host(host: &str) -> Result<Vec<IpAddr>, ServerError> {
    let addrs = (host, 0u16)
        .to_socket_addrs()
        .map_err(|source| ServerError::Resolve {
            host: host.to_owned(),
            source,
        })?;
    let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
    if ips.is_empty() {
        return Err(ServerError::NoAddresses {
            host: host.to_owned(),
        });
    }
    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_resolves() {
        let addrs = resolve_host("localhost").unwrap();
        assert!(addrs.iter().any(|addr| addr.is_loopback()));
    }

    #[test]
    fn test_unresolvable_host_is_reported() {
        let err = resolve_host("no-such-host.invalid").unwrap_err();
        assert!(matches!(err, ServerError::Resolve { .. } | ServerError::NoAddresses { .. }));
    }

    #[test]
    fn test_bind_fails_for_unresolvable_allowed_host() {
        let err = Server::bind(ServerConfig {
            port: 0,
            srchost: Some("no-such-host.invalid".into()),
        })
        .err()
        .expect("bind should fail for an unresolvable host");
        assert!(matches!(err, ServerError::Resolve { .. } | ServerError::NoAddresses { .. }));
    }

    #[test]
    fn test_allow_list_screens_peers() {
        let server = Server::bind(ServerConfig {
            port: 0,
            srchost: Some("localhost".into()),
        })
        .unwrap();
        let loopback: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let stranger: SocketAddr = "192.0.2.1:9999".parse().unwrap();
        assert!(server.peer_allowed(&loopback));
        assert!(!server.peer_allowed(&stranger));
    }
}
