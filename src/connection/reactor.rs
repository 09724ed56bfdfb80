//! Readiness-Multiplexed Engine
//!
//! One task owns the listener, the store and every client socket. Each turn
//! of the event loop:
//!
//! 1. Runs the expiry cycle if the cron interval has elapsed
//! 2. Waits until the listener or some client is readable, or until the next
//!    cron deadline
//! 3. Accepts and registers a new client, or serves the chunk a ready client
//!    sent, closing it on EOF or any error
//!
//! Each client socket is split. The read half sits in a `StreamMap` whose
//! streams yield one read of at most `read_buffer_size` bytes per readiness
//! event; the write half sits in a map keyed by the same connection id.
//! Replies are written with `try_write` and never awaited, so the loop only
//! ever suspends in its `select!`. A client whose socket cannot take a whole
//! reply has stopped reading and is closed.
//!
//! Only one thing ever touches the [`Store`], so it needs no lock. Run this
//! on a current-thread runtime to keep all work on one thread.

use crate::commands::CommandTable;
use crate::config::ServerConfig;
use crate::connection::session::{ActiveConnection, ConnectionError, ConnectionStats, Session};
use crate::storage::{run_expiry_cycle, Store};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::{sleep_until, Instant};
use tokio_stream::{Stream, StreamExt, StreamMap};
use tracing::{debug, error, info, warn};

type ConnectionId = u64;

/// Read half of a registered client. Yields each chunk read from the socket;
/// an empty chunk is end of stream.
#[derive(Debug)]
struct Inbound {
    reader: OwnedReadHalf,
    buf: Vec<u8>,
}

impl Stream for Inbound {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut buf = ReadBuf::new(&mut this.buf);
        match Pin::new(&mut this.reader).poll_read(cx, &mut buf) {
            Poll::Ready(Ok(())) => Poll::Ready(Some(Ok(buf.filled().to_vec()))),
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Write half of a registered client.
#[derive(Debug)]
struct Client {
    writer: OwnedWriteHalf,
    addr: SocketAddr,
    _active: ActiveConnection,
}

/// What serving one chunk left the client in.
enum Pass {
    /// Replied; keep the client registered
    Open,
    /// The client closed its end
    Eof,
}

/// Serves every client from a single task.
#[derive(Debug)]
pub struct Reactor {
    listener: TcpListener,
    store: Store,
    session: Session,
    config: ServerConfig,
}

impl Reactor {
    /// Binds to the configured address.
    pub async fn bind(config: ServerConfig, table: CommandTable) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::from_listener(listener, config, table))
    }

    /// Serves on an already bound listener with a fresh store.
    pub fn from_listener(listener: TcpListener, config: ServerConfig, table: CommandTable) -> Self {
        Self::with_store(listener, config, table, Store::new())
    }

    /// Serves on an already bound listener with the given store.
    pub fn with_store(listener: TcpListener, config: ServerConfig, table: CommandTable, store: Store) -> Self {
        Self {
            listener,
            store,
            session: Session::new(table),
            config,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(self.session.stats())
    }

    /// Runs the event loop until `shutdown` completes.
    ///
    /// Every client socket is closed on the way out. The store is handed back
    /// to the caller.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Store {
        info!(addr = ?self.listener.local_addr().ok(), "Starting reactor");

        let mut inbound: StreamMap<ConnectionId, Inbound> = StreamMap::new();
        let mut clients: HashMap<ConnectionId, Client> = HashMap::new();
        let mut next_id: ConnectionId = 0;
        let mut last_cron = Instant::now();
        tokio::pin!(shutdown);

        loop {
            if last_cron.elapsed() >= self.config.cron_interval {
                run_expiry_cycle(&mut self.store);
                last_cron = Instant::now();
            }
            let next_cron = last_cron + self.config.cron_interval;

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if clients.len() >= self.config.max_connections {
                            warn!(client = %addr, "Connection limit reached, rejecting client");
                            self.session.stats().connection_rejected();
                            continue;
                        }
                        let (reader, writer) = stream.into_split();
                        inbound.insert(
                            next_id,
                            Inbound {
                                reader,
                                buf: vec![0u8; self.config.read_buffer_size],
                            },
                        );
                        clients.insert(
                            next_id,
                            Client {
                                writer,
                                addr,
                                _active: self.session.stats().track(),
                            },
                        );
                        info!(client = %addr, active = clients.len(), "Client connected");
                        next_id += 1;
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some((id, chunk)) = inbound.next(), if !inbound.is_empty() => {
                    if !self.serve(&mut clients, id, chunk) {
                        inbound.remove(&id);
                    }
                }
                _ = sleep_until(next_cron) => {}
                _ = &mut shutdown => break,
            }
        }

        info!(connections = clients.len(), "Reactor shutting down");
        drop(inbound);
        drop(clients);
        self.store
    }

    /// Serves one chunk from a client. Returns `false` once the client has
    /// been closed and must be deregistered.
    fn serve(
        &mut self,
        clients: &mut HashMap<ConnectionId, Client>,
        id: ConnectionId,
        chunk: io::Result<Vec<u8>>,
    ) -> bool {
        let Some(client) = clients.get(&id) else {
            return false;
        };
        let addr = client.addr;

        let outcome = match chunk {
            Ok(chunk) => serve_chunk(client, &chunk, &mut self.store, &self.session),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(Pass::Open) => return true,
            Ok(Pass::Eof) => info!(client = %addr, "Client disconnected"),
            Err(ConnectionError::Io(ref e)) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(client = %addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %addr, error = %e, "Closing connection"),
        }
        clients.remove(&id);
        false
    }
}

/// Decode, evaluate and reply to one chunk.
fn serve_chunk(client: &Client, chunk: &[u8], store: &mut Store, session: &Session) -> Result<Pass, ConnectionError> {
    if chunk.is_empty() {
        return Ok(Pass::Eof);
    }
    session.stats().bytes_read(chunk.len());

    let reply = session.respond(chunk, store)?;
    write_reply(&client.writer, &reply)?;
    session.stats().bytes_written(reply.len());

    Ok(Pass::Open)
}

/// Writes a whole reply without waiting for the socket.
fn write_reply(writer: &OwnedWriteHalf, mut reply: &[u8]) -> Result<(), ConnectionError> {
    while !reply.is_empty() {
        match writer.try_write(reply) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => reply = &reply[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(ConnectionError::SlowReader),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{now_ms, Expiry};
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpSocket, TcpStream};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Running {
        addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<Store>,
    }

    impl Running {
        async fn stop(self) -> Store {
            self.stop.send(()).unwrap();
            self.handle.await.unwrap()
        }
    }

    async fn start(config: ServerConfig, store: Store) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let reactor = Reactor::with_store(listener, config, CommandTable::with_keyspace(), store);
        let stats = reactor.stats();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(reactor.run(async {
            let _ = stop_rx.await;
        }));
        Running {
            addr,
            stats,
            stop,
            handle,
        }
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8]) -> Vec<u8> {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; 512];
        let n = client.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn test_ping_variants() {
        let server = start(ServerConfig::default(), Store::new()).await;
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");
        assert_eq!(
            roundtrip(&mut client, b"*2\r\n$4\r\nPING\r\n$5\r\nhello\r\n").await,
            b"$5\r\nhello\r\n"
        );
        assert_eq!(
            roundtrip(&mut client, b"*3\r\n$4\r\nPING\r\n$1\r\na\r\n$1\r\nb\r\n").await,
            b"-ERR wrong number of arguments for 'ping' command\r\n"
        );
        // Still open after the arity error.
        assert_eq!(roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_eof_closes_only_that_connection() {
        let server = start(ServerConfig::default(), Store::new()).await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        let mut second = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(roundtrip(&mut first, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");
        assert_eq!(roundtrip(&mut second, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");
        assert_eq!(server.stats.active(), 2);

        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(server.stats.active(), 1);
        assert_eq!(roundtrip(&mut second, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");

        let stats = Arc::clone(&server.stats);
        server.stop().await;
        assert_eq!(stats.active(), 0);
    }

    #[tokio::test]
    async fn test_decode_error_closes_connection() {
        let server = start(ServerConfig::default(), Store::new()).await;

        let mut bad = TcpStream::connect(server.addr).await.unwrap();
        let mut good = TcpStream::connect(server.addr).await.unwrap();
        bad.write_all(b"?what\r\n").await.unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(bad.read(&mut buf).await.unwrap(), 0);
        assert_eq!(roundtrip(&mut good, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_client_that_never_reads_does_not_stall_others() {
        let server = start(ServerConfig::default(), Store::new()).await;

        let socket = TcpSocket::new_v4().unwrap();
        socket.set_recv_buffer_size(4096).unwrap();
        let mut flooder = socket.connect(server.addr).await.unwrap();

        // One 512-byte PING per server read, each echoing 490 bytes back.
        let mut frame = b"*2\r\n$4\r\nPING\r\n$490\r\n".to_vec();
        frame.extend(std::iter::repeat(b'x').take(490));
        frame.extend_from_slice(b"\r\n");
        assert_eq!(frame.len(), 512);

        let flood = tokio::spawn(async move {
            for _ in 0..20_000 {
                if flooder.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut other = TcpStream::connect(server.addr).await.unwrap();
        let reply = timeout(Duration::from_secs(2), roundtrip(&mut other, b"*1\r\n$4\r\nPING\r\n"))
            .await
            .unwrap();
        assert_eq!(reply, b"+PONG\r\n");

        // The flooder is dropped by the server once its replies back up.
        timeout(Duration::from_secs(5), flood).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats.active(), 1);

        timeout(Duration::from_secs(2), server.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_persists_across_clients() {
        let server = start(ServerConfig::default(), Store::new()).await;

        let mut writer = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(
            roundtrip(&mut writer, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n").await,
            b"+OK\r\n"
        );
        drop(writer);

        let mut reader = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(roundtrip(&mut reader, b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await, b"$1\r\nv\r\n");

        let store = server.stop().await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cron_reclaims_expired_keys_while_idle() {
        let mut store = Store::new();
        let past = now_ms() - 1_000;
        for i in 0..30 {
            store.set_with_expiry(Bytes::from(format!("exp{}", i)), Bytes::from("v"), Expiry::At(past));
        }
        for i in 0..10 {
            store.set(Bytes::from(format!("keep{}", i)), Bytes::from("v"));
        }

        let config = ServerConfig {
            cron_interval: Duration::from_millis(20),
            ..ServerConfig::default()
        };
        let server = start(config, store).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let store = server.stop().await;
        assert_eq!(store.len(), 10);
        assert_eq!(store.expired_count(), 30);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let server = start(config, Store::new()).await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        assert_eq!(roundtrip(&mut first, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");

        let mut second = TcpStream::connect(server.addr).await.unwrap();
        let mut buf = [0u8; 16];
        let _ = second.write_all(b"*1\r\n$4\r\nPING\r\n").await;
        assert_eq!(second.read(&mut buf).await.unwrap_or(0), 0);

        assert_eq!(roundtrip(&mut first, b"*1\r\n$4\r\nPING\r\n").await, b"+PONG\r\n");
        server.stop().await;
    }
}
