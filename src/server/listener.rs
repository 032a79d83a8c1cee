// Listener module
// Binds TCP listeners with SO_REUSEADDR for every configured port

use crate::error::{ServerError, ServerResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Backlog queue size for every listener
const BACKLOG: i32 = 128;

/// Create a `TcpListener` with `SO_REUSEADDR` enabled.
///
/// A port that already has a listener fails with `AddrInUse`, so a port
/// listed twice or shared by both listener kinds is a bind error.
/// Must be called from within a tokio runtime.
pub fn create_reusable_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Bind one listener per address, failing on the first address that cannot be bound
pub fn bind_all(addrs: &[SocketAddr]) -> ServerResult<Vec<TcpListener>> {
    addrs
        .iter()
        .map(|addr| {
            create_reusable_listener(*addr).map_err(|source| ServerError::Bind {
                addr: *addr,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_ports() {
        let addrs: Vec<SocketAddr> = vec![
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:0".parse().unwrap(),
        ];
        let listeners = bind_all(&addrs).unwrap();
        assert_eq!(listeners.len(), 2);
        for listener in &listeners {
            assert_ne!(listener.local_addr().unwrap().port(), 0);
        }
    }

    #[tokio::test]
    async fn test_port_already_bound_is_an_error() {
        let first = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let taken = first.local_addr().unwrap();

        match bind_all(&[taken]) {
            Err(ServerError::Bind { addr, source }) => {
                assert_eq!(addr, taken);
                assert_eq!(source.kind(), std::io::ErrorKind::AddrInUse);
            }
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bind_failure_names_address() {
        // TEST-NET-1 is never assigned to a local interface
        let addr: SocketAddr = "192.0.2.1:0".parse().unwrap();
        match bind_all(&[addr]) {
            Err(ServerError::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind error, got {other:?}"),
        }
    }
}
