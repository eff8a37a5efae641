use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
};

use log::{debug, info, warn};
use socket2::{Domain, Socket, Type};
use thiserror::Error;

use crate::codec::{self, MAX_HEADER, Status};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listen socket: {0}")]
    Bind(io::Error),
}

/// List of possible errors a request handler can report back to the serve
/// loop. They are logged there; the connection itself has already been
/// answered or torn down by the handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("worker pool is no longer accepting jobs")]
    Rejected,

    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

/// Single-owner handle for one accepted connection.
///
/// The serve loop creates a `Context` per accepted socket and moves it into
/// the handler; the handler either answers synchronously or moves it on into
/// a job for deferred processing. Whoever holds it last drops it, which
/// closes the socket, so the connection is released exactly once.
#[derive(Debug)]
pub struct Context {
    stream: TcpStream,
}

impl Context {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Write `data` fully to the peer. Partial writes are retried
    /// internally; any error means the connection is unusable.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    /// Format and send a response header. `filelen` is only meaningful for
    /// [`Status::Ok`]. Returns the number of header bytes sent.
    pub fn send_header(&mut self, status: Status, filelen: u64) -> io::Result<usize> {
        let header = codec::response_header(status, filelen);
        self.send(header.as_bytes())?;
        Ok(header.len())
    }

    /// Close the connection and release the context.
    pub fn abort(self) {}
}

/// Request handler invoked once per valid request.
///
/// The handler receives the [`Context`] by value and with it the
/// responsibility to answer the peer and close the connection, either
/// directly or by transferring the context into deferred work.
pub trait Handler: Send {
    fn handle(&mut self, ctx: Context, path: &str) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: FnMut(Context, &str) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, ctx: Context, path: &str) -> Result<(), HandlerError> {
        self(ctx, path)
    }
}

/// Listen backlog applied when the caller does not pick one.
pub const DEFAULT_MAX_PENDING: usize = 24;

/// GETFILE accept/dispatch loop.
///
/// Reads and validates one request per connection. Malformed requests are
/// answered with `INVALID` and closed without involving the handler; valid
/// requests are handed to the handler exactly once.
pub struct Server<H: Handler> {
    port: u16,
    max_pending: usize,
    handler: H,
}

impl<H: Handler> Server<H> {
    pub fn new(port: u16, handler: H) -> Self {
        Self {
            port,
            max_pending: DEFAULT_MAX_PENDING,
            handler,
        }
    }

    /// Set the listen backlog: how many not-yet-accepted connections the OS
    /// queues before refusing new ones.
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Bind the listen socket with the configured backlog and serve forever.
    pub fn serve(self) -> Result<(), ServerError> {
        let listener =
            listen_socket(self.port, self.max_pending).map_err(ServerError::Bind)?;
        self.run(listener)
    }

    /// Serve connections from an already bound listener.
    ///
    /// Transient accept failures are logged and retried; the loop never
    /// terminates on its own.
    pub fn run(mut self, listener: TcpListener) -> Result<(), ServerError> {
        if let Ok(addr) = listener.local_addr() {
            info!("listening at {addr}");
        }

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!("accepted connection from {peer}");
                    self.serve_connection(stream);
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
    }

    fn serve_connection(&mut self, stream: TcpStream) {
        let mut ctx = Context::new(stream);

        let header = match read_request(&mut ctx.stream) {
            Ok(Some(header)) => header,
            Ok(None) => {
                debug!("no complete request header; rejecting");
                let _ = ctx.send_header(Status::Invalid, 0);
                ctx.abort();
                return;
            }
            Err(e) => {
                warn!("failed to read request: {e}");
                ctx.abort();
                return;
            }
        };

        let path = match codec::parse_request(&header) {
            Ok(path) => path,
            Err(e) => {
                debug!("invalid request: {e}");
                let _ = ctx.send_header(Status::Invalid, 0);
                ctx.abort();
                return;
            }
        };

        info!("GET {path}");
        if let Err(e) = self.handler.handle(ctx, &path) {
            warn!("handler failed for {path}: {e}");
        }
    }
}

/// Build the listen socket with an explicit accept backlog.
///
/// `std::net::TcpListener::bind` hides the backlog argument, so the socket
/// is assembled through `socket2` instead.
fn listen_socket(port: u16, max_pending: usize) -> io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(max_pending.try_into().unwrap_or(i32::MAX))?;
    Ok(socket.into())
}

/// Accumulate request bytes until the header terminator shows up.
///
/// Reads in chunks rather than byte-at-a-time; requests carry no body, so
/// nothing useful can follow the terminator. `Ok(None)` covers both a peer
/// that closed early and a header that overran [`MAX_HEADER`] without a
/// terminator; the caller answers `INVALID` for either.
fn read_request(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut header = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];

    while header.len() < MAX_HEADER {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        header.extend_from_slice(&chunk[..n]);
        if codec::find_terminator(&header).is_some() {
            return Ok(Some(header));
        }
    }

    Ok(None)
}
