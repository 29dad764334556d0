use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use mio::net::TcpListener;
use mio::Interest;
use parking_lot::Mutex;

use relay_reactor::{EventHandler, FdKind, Rearm, Reactor, ReactorError};
use relay_router::Router;

use crate::connection::ServerConnection;

/// Accepts connections on a bound listener and hands each one to a fresh
/// `ServerConnection`. Registered with the reactor exactly once; accepting
/// happens in a loop until `WouldBlock` per the edge-triggered contract.
pub struct ServerListener {
    listener: Mutex<TcpListener>,
    reactor: Arc<Reactor>,
    router: Arc<Router>,
}

impl ServerListener {
    pub fn bind(addr: SocketAddr, reactor: Arc<Reactor>, router: Arc<Router>) -> std::io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)?;
        let fd = listener.as_raw_fd();
        let this = Arc::new(Self { listener: Mutex::new(listener), reactor: reactor.clone(), router });
        reactor
            .register(fd, FdKind::Socket, Interest::READABLE, this.clone())
            .map_err(reactor_err_to_io)?;
        Ok(this)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.lock().local_addr().expect("bound listener has a local address")
    }
}

fn reactor_err_to_io(e: ReactorError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

impl EventHandler for ServerListener {
    fn on_ready(&self, _readable: bool, _writable: bool) -> Rearm {
        loop {
            let accepted = self.listener.lock().accept();
            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
                    }
                    match ServerConnection::accept(self.reactor.clone(), self.router.clone(), stream) {
                        Ok(()) => tracing::debug!(%peer, "accepted connection"),
                        Err(e) => tracing::warn!(%peer, error = %e, "failed to register accepted connection"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept() failed");
                    break;
                }
            }
        }
        Rearm::With(Interest::READABLE)
    }
}
