//! TCP server for the line-tally protocol.
//!
//! Accepts connections forever and spawns one task per connection. Sessions
//! only share the message counter; an error on one connection never reaches
//! another or the accept loop.

use crate::config::Config;
use crate::counter::MessageCounter;
use crate::session;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance bound to its listening socket
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    counter: Arc<MessageCounter>,
}

impl Server {
    /// Bind the configured address.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &Config, counter: Arc<MessageCounter>) -> Result<Self, ServerError> {
        let addr = resolve(&config.listen)
            .map_err(|e| ServerError::Bind(config.listen.clone(), e))?;
        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|e| ServerError::Bind(config.listen.clone(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(config.listen.clone(), e))?;

        info!(address = %local_addr, "Server listening");

        Ok(Server {
            listener,
            local_addr,
            counter,
        })
    }

    /// Address actually bound, useful when listening on port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared counter handed to every session
    pub fn counter(&self) -> &Arc<MessageCounter> {
        &self.counter
    }

    /// Accept connections until the process ends.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Server is running and waiting for clients");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(peer = %peer, total = self.counter.current(), "New client connected");

                    let counter = Arc::clone(&self.counter);
                    tokio::spawn(async move {
                        if let Err(e) = session::handle_connection(stream, peer, counter).await {
                            warn!(peer = %peer, error = %e, "Error handling client");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

fn resolve(listen: &str) -> io::Result<SocketAddr> {
    listen.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address resolved for '{listen}'"),
        )
    })
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}

/// Server startup errors
#[derive(Debug)]
pub enum ServerError {
    Bind(String, io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind '{}': {}", addr, e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind(_, e) => Some(e),
        }
    }
}
