//! Detection of clients leaving while their request is in flight.
//!
//! actix keeps polling a handler after its client has closed the connection, so the fetch
//! handler cannot learn about the disconnect from being dropped. [`watch_connection`] runs for
//! every accepted connection: it spawns a watcher peeking at a duplicate of the socket and
//! stores a [`ConnectionWatch`] in the connection data. Once the peer has closed its side, the
//! watcher shuts the socket down in both directions, so no response byte reaches it, and marks
//! the connection as closed.

use std::any::Any;
use std::io;
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::time::Duration;

use actix_web::dev::Extensions;
use actix_web::rt::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Delay between peeks while the socket holds bytes the server has not read yet.
const PENDING_DATA_BACKOFF: Duration = Duration::from_millis(50);

/// Resolves once the peer of a connection has gone away.
#[derive(Debug, Clone)]
pub struct ConnectionClosed(watch::Receiver<bool>);

impl ConnectionClosed {
    pub fn is_closed(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Waits for the peer to close. Also returns when the watcher is gone.
    pub async fn wait(mut self) {
        let _ = self.0.wait_for(|closed| *closed).await;
    }
}

/// Per-connection data inserted by [`watch_connection`].
///
/// actix drops it together with the connection, which stops the watcher.
#[derive(Debug)]
pub struct ConnectionWatch {
    closed: ConnectionClosed,
    _stop_tx: oneshot::Sender<()>,
}

impl ConnectionWatch {
    pub fn closed(&self) -> ConnectionClosed {
        self.closed.clone()
    }
}

/// Connect hook for [`actix_web::HttpServer::on_connect`].
///
/// Connections that are not plain TCP, or whose socket cannot be duplicated, get no watch.
pub fn watch_connection(connection: &dyn Any, data: &mut Extensions) {
    let Some(stream) = connection.downcast_ref::<TcpStream>() else {
        return;
    };

    let watched = match duplicate(stream) {
        Ok(watched) => watched,
        Err(err) => {
            warn!(error = %err, "failed to watch client connection");
            return;
        }
    };

    let (closed_tx, closed_rx) = watch::channel(false);
    let (stop_tx, stop_rx) = oneshot::channel();

    tokio::spawn(async move {
        let peer_closed = tokio::select! {
            _ = stop_rx => false,
            _ = wait_for_peer_close(&watched) => true,
        };

        if peer_closed {
            debug!("client closed the connection");
            closed_tx.send_replace(true);
            if let Err(err) = shut_down(watched) {
                debug!(error = %err, "failed to shut down closed connection");
            }
        }
    });

    data.insert(ConnectionWatch {
        closed: ConnectionClosed(closed_rx),
        _stop_tx: stop_tx,
    });
}

/// Registers a second descriptor of the same socket with the runtime.
fn duplicate(stream: &TcpStream) -> io::Result<TcpStream> {
    let fd = stream.as_fd().try_clone_to_owned()?;
    let stream = std::net::TcpStream::from(fd);
    stream.set_nonblocking(true)?;

    TcpStream::from_std(stream)
}

async fn wait_for_peer_close(stream: &TcpStream) {
    let mut buf = [0u8; 1];

    loop {
        match stream.peek(&mut buf).await {
            Ok(0) => return,
            // Pipelined bytes are left for actix to read.
            Ok(_) => tokio::time::sleep(PENDING_DATA_BACKOFF).await,
            Err(err) => {
                debug!(error = %err, "client connection failed");
                return;
            }
        }
    }
}

/// Shuts the socket down for every descriptor sharing it, the server's included.
fn shut_down(stream: TcpStream) -> io::Result<()> {
    stream.into_std()?.shutdown(Shutdown::Both)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();

        (client, server)
    }

    async fn closed_within(closed: &ConnectionClosed, limit: Duration) -> bool {
        tokio::time::timeout(limit, closed.clone().wait())
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn peer_close_is_detected() {
        let (client, server) = connected_pair().await;
        let mut data = Extensions::new();

        watch_connection(&server, &mut data);
        let closed = data.get::<ConnectionWatch>().unwrap().closed();
        assert!(!closed.is_closed());

        drop(client);

        assert!(closed_within(&closed, Duration::from_secs(1)).await);
        assert!(closed.is_closed());
    }

    #[tokio::test]
    async fn unread_request_bytes_are_not_a_close() {
        let (mut client, mut server) = connected_pair().await;
        let mut data = Extensions::new();

        watch_connection(&server, &mut data);
        let closed = data.get::<ConnectionWatch>().unwrap().closed();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        assert!(!closed_within(&closed, Duration::from_millis(200)).await);

        // The watcher only peeked: the server still reads every byte.
        let mut request = [0u8; 18];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[tokio::test]
    async fn closed_connection_is_shut_down_for_the_server() {
        let (client, server) = connected_pair().await;
        let (mut client_read, client_write) = client.into_split();
        let mut data = Extensions::new();

        watch_connection(&server, &mut data);
        let closed = data.get::<ConnectionWatch>().unwrap().closed();

        // Half close: the client can still read whatever the server writes.
        drop(client_write);
        assert!(closed_within(&closed, Duration::from_secs(1)).await);

        let _ = server.try_write(b"late response");
        let mut received = Vec::new();
        let _ = tokio::time::timeout(
            Duration::from_secs(1),
            client_read.read_to_end(&mut received),
        )
        .await;
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_watch_stops_the_watcher() {
        let (_client, server) = connected_pair().await;
        let mut data = Extensions::new();

        watch_connection(&server, &mut data);
        let closed = data.get::<ConnectionWatch>().unwrap().closed();
        drop(data);

        // The watcher exits without flagging a close the peer never made.
        assert!(closed_within(&closed, Duration::from_secs(1)).await);
        assert!(!*closed.0.borrow());
    }
}
