//! GETFILE client engine.
//!
//! A [`Transfer`] is a single-use-per-call request handle: it knows the
//! target server, port and path, and streams the response through optional
//! caller-supplied callbacks while keeping byte accounting. Header delivery
//! always precedes data delivery, data delivery is strictly ordered and
//! cumulative, and the total handed to the data callback after a successful
//! `OK` transfer equals [`Transfer::bytes_received`].
//!
//! Application-level failure statuses (`FILE_NOT_FOUND`, `ERROR`,
//! `INVALID`) are not engine failures: [`Transfer::perform`] returns `Ok`
//! and the caller inspects [`Transfer::status`]. Transport and framing
//! problems surface as [`ClientError`].
use std::{
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
};

use log::{debug, trace};
use thiserror::Error;

use crate::codec::{self, CodecError, MAX_HEADER, Status};

const DATA_BUFSIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to resolve {server}:{port}: {source}")]
    Resolve {
        server: String,
        port: u16,
        source: io::Error,
    },

    #[error("unable to connect to {server}:{port}")]
    Connect { server: String, port: u16 },

    #[error("transport failure: {0}")]
    Io(#[from] io::Error),

    #[error("response header exceeds {MAX_HEADER} bytes without a terminator")]
    HeaderOverflow,

    #[error("connection closed before a complete header arrived")]
    TruncatedHeader,

    #[error("malformed response header: {0}")]
    Header(#[from] CodecError),

    #[error("connection closed after {received} of {expected} body bytes")]
    PrematureClose { received: u64, expected: u64 },
}

type Callback<'a> = Box<dyn FnMut(&[u8]) + 'a>;

/// Mutable request handle for one GETFILE download at a time.
///
/// Not meant for concurrent `perform` calls on one handle (`&mut self`
/// enforces as much); independent handles run concurrently just fine.
pub struct Transfer<'a> {
    server: String,
    port: u16,
    path: String,

    header_cb: Option<Callback<'a>>,
    data_cb: Option<Callback<'a>>,

    status: Status,
    filelen: u64,
    bytes_received: u64,
}

impl<'a> Transfer<'a> {
    pub fn new(server: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            path: path.into(),
            header_cb: None,
            data_cb: None,
            status: Status::Invalid,
            filelen: 0,
            bytes_received: 0,
        }
    }

    /// Register a callback invoked at most once per perform, with exactly
    /// the header bytes (terminator included), before any body data.
    pub fn on_header<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8]) + 'a,
    {
        self.header_cb = Some(Box::new(callback));
        self
    }

    /// Register a callback invoked for every body chunk, in order.
    pub fn on_data<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[u8]) + 'a,
    {
        self.data_cb = Some(Box::new(callback));
        self
    }

    /// Status of the most recent perform.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Body length the server declared; 0 when it omitted the field.
    pub fn filelen(&self) -> u64 {
        self.filelen
    }

    /// Body bytes delivered to the data callback so far. Capped at
    /// [`filelen`](Transfer::filelen) when the server declared a length;
    /// equals it after a full `OK` transfer.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Issue the request and stream the response.
    ///
    /// Resets accumulated state, resolves and connects, sends the request
    /// line, parses the header and delivers the body. The socket is closed
    /// on every exit path. A non-`OK` status is a completed operation, not
    /// an error.
    pub fn perform(&mut self) -> Result<(), ClientError> {
        self.status = Status::Invalid;
        self.filelen = 0;
        self.bytes_received = 0;

        let mut stream = self.connect()?;
        stream.write_all(codec::request_line(&self.path).as_bytes())?;

        // Accumulate header bytes; a read may return a partial header or
        // the header plus leading body bytes.
        let mut buf = Vec::with_capacity(512);
        let mut chunk = [0u8; 512];
        let header_end = loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::TruncatedHeader);
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = codec::find_terminator(&buf) {
                break end;
            }
            if buf.len() >= MAX_HEADER {
                return Err(ClientError::HeaderOverflow);
            }
        };

        let header = codec::parse_response(&buf[..header_end])?;
        self.status = header.status;
        self.filelen = header.filelen;
        debug!(
            "{} {} for {}",
            self.status, self.filelen, self.path
        );

        if let Some(callback) = self.header_cb.as_mut() {
            callback(&buf[..header_end]);
        }

        if self.status != Status::Ok {
            self.bytes_received = 0;
            return Ok(());
        }

        // Body bytes that rode in with the header are delivered first,
        // clamped at the declared length; a peer that sends past its own
        // header cannot inflate the accounting.
        if buf.len() > header_end {
            let mut body = &buf[header_end..];
            if self.filelen > 0 && body.len() as u64 > self.filelen {
                body = &body[..self.filelen as usize];
            }
            self.bytes_received += body.len() as u64;
            if let Some(callback) = self.data_cb.as_mut() {
                callback(body);
            }
        }

        let mut data = [0u8; DATA_BUFSIZE];
        while self.filelen == 0 || self.bytes_received < self.filelen {
            let want = match self.filelen {
                0 => data.len(),
                len => (len - self.bytes_received).min(data.len() as u64) as usize,
            };
            let n = stream.read(&mut data[..want])?;
            if n == 0 {
                if self.bytes_received < self.filelen {
                    return Err(ClientError::PrematureClose {
                        received: self.bytes_received,
                        expected: self.filelen,
                    });
                }
                break;
            }
            self.bytes_received += n as u64;
            if let Some(callback) = self.data_cb.as_mut() {
                callback(&data[..n]);
            }
        }

        Ok(())
    }

    /// Resolve the server and try every candidate address in order,
    /// stopping at the first successful connection. Resolution is family
    /// agnostic; IPv4 and IPv6 candidates both come back.
    fn connect(&self) -> Result<TcpStream, ClientError> {
        let candidates = (self.server.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| ClientError::Resolve {
                server: self.server.clone(),
                port: self.port,
                source,
            })?;

        for addr in candidates {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    trace!("connected to {addr}");
                    return Ok(stream);
                }
                Err(e) => trace!("connect to {addr} failed: {e}"),
            }
        }

        Err(ClientError::Connect {
            server: self.server.clone(),
            port: self.port,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        net::{SocketAddr, TcpListener},
        thread::{self, JoinHandle},
        time::Duration,
    };

    use super::*;

    /// One-shot listener that consumes the request and plays back the given
    /// chunks with a short pause between them, then closes.
    fn scripted_server(chunks: Vec<Vec<u8>>) -> (SocketAddr, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut request = vec![0u8; 512];
            let mut len = 0;
            while codec::find_terminator(&request[..len]).is_none() {
                let n = stream.read(&mut request[len..]).unwrap();
                assert!(n > 0, "client closed before sending a full request");
                len += n;
            }

            for chunk in chunks {
                stream.write_all(&chunk).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(10));
            }
            request[..len].to_vec()
        });

        (addr, handle)
    }

    #[test]
    fn successful_transfer_accounts_every_byte() {
        let body = b"hello, getfile".to_vec();
        let mut response = format!("GETFILE OK {}\r\n\r\n", body.len()).into_bytes();
        response.extend_from_slice(&body);
        let (addr, server) = scripted_server(vec![response]);

        let mut received = Vec::new();
        let mut headers = 0usize;
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/hello")
            .on_header(|_| headers += 1)
            .on_data(|chunk| received.extend_from_slice(chunk));

        transfer.perform().unwrap();

        assert_eq!(transfer.status(), Status::Ok);
        assert_eq!(transfer.filelen(), body.len() as u64);
        assert_eq!(transfer.bytes_received(), body.len() as u64);
        drop(transfer);
        assert_eq!(received, body);
        assert_eq!(headers, 1);

        let request = server.join().unwrap();
        assert_eq!(request, b"GETFILE GET /hello\r\n\r\n");
    }

    #[test]
    fn header_split_across_reads_with_riding_body_bytes() {
        // Terminator lands mid-second-chunk; the trailing body bytes must
        // reach the data callback, not be dropped with the header.
        let (addr, _server) = scripted_server(vec![
            b"GETFILE OK ".to_vec(),
            b"5\r\n\r\nab".to_vec(),
            b"cde".to_vec(),
        ]);

        let mut header = Vec::new();
        let mut received = Vec::new();
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/split")
            .on_header(|bytes| header.extend_from_slice(bytes))
            .on_data(|chunk| received.extend_from_slice(chunk));

        transfer.perform().unwrap();

        assert_eq!(transfer.bytes_received(), 5);
        drop(transfer);
        assert_eq!(header, b"GETFILE OK 5\r\n\r\n");
        assert_eq!(received, b"abcde");
    }

    #[test]
    fn byte_at_a_time_feed_parses_correctly() {
        let chunks = b"GETFILE OK 3\r\n\r\nxyz"
            .iter()
            .map(|b| vec![*b])
            .collect::<Vec<_>>();
        let (addr, _server) = scripted_server(chunks);

        let mut received = Vec::new();
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/slow")
            .on_data(|chunk| received.extend_from_slice(chunk));

        transfer.perform().unwrap();

        assert_eq!(transfer.status(), Status::Ok);
        assert_eq!(transfer.bytes_received(), 3);
        drop(transfer);
        assert_eq!(received, b"xyz");
    }

    #[test]
    fn body_riding_past_declared_length_is_discarded() {
        // Three bytes declared, six sent in the same segment as the header.
        let (addr, _server) = scripted_server(vec![b"GETFILE OK 3\r\n\r\nabcdef".to_vec()]);

        let mut received = Vec::new();
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/over")
            .on_data(|chunk| received.extend_from_slice(chunk));

        transfer.perform().unwrap();

        assert_eq!(transfer.status(), Status::Ok);
        assert_eq!(transfer.filelen(), 3);
        assert!(transfer.bytes_received() <= transfer.filelen());
        assert_eq!(transfer.bytes_received(), 3);
        drop(transfer);
        assert_eq!(received, b"abc");
    }

    #[test]
    fn oversending_peer_cannot_push_accounting_past_filelen() {
        let (addr, _server) = scripted_server(vec![
            b"GETFILE OK 4\r\n\r\n".to_vec(),
            b"wxyzEXTRA".to_vec(),
        ]);

        let mut received = Vec::new();
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/over")
            .on_data(|chunk| received.extend_from_slice(chunk));

        transfer.perform().unwrap();

        assert_eq!(transfer.bytes_received(), 4);
        drop(transfer);
        assert_eq!(received, b"wxyz");
    }

    #[test]
    fn non_ok_status_completes_with_zero_bytes() {
        let (addr, _server) =
            scripted_server(vec![b"GETFILE FILE_NOT_FOUND\r\n\r\n".to_vec()]);

        let mut data_calls = 0usize;
        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/missing")
            .on_data(|_| data_calls += 1);

        transfer.perform().unwrap();

        assert_eq!(transfer.status(), Status::FileNotFound);
        assert_eq!(transfer.filelen(), 0);
        assert_eq!(transfer.bytes_received(), 0);
        drop(transfer);
        assert_eq!(data_calls, 0);
    }

    #[test]
    fn unknown_status_parses_to_invalid() {
        let (addr, _server) = scripted_server(vec![b"GETFILE GONE\r\n\r\n".to_vec()]);

        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/x");
        transfer.perform().unwrap();

        assert_eq!(transfer.status(), Status::Invalid);
        assert_eq!(transfer.bytes_received(), 0);
    }

    #[test]
    fn mismatched_scheme_fails_the_operation() {
        let (addr, _server) = scripted_server(vec![b"HTTP/1.1 200 OK\r\n\r\n".to_vec()]);

        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/x");
        let err = transfer.perform().unwrap_err();

        assert!(matches!(err, ClientError::Header(_)));
    }

    #[test]
    fn premature_close_is_an_error() {
        let (addr, _server) = scripted_server(vec![b"GETFILE OK 10\r\n\r\nfour".to_vec()]);

        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/short");
        let err = transfer.perform().unwrap_err();

        assert!(matches!(
            err,
            ClientError::PrematureClose {
                received: 4,
                expected: 10
            }
        ));
    }

    #[test]
    fn close_before_header_is_an_error() {
        let (addr, _server) = scripted_server(vec![b"GETFILE OK".to_vec()]);

        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/x");
        let err = transfer.perform().unwrap_err();

        assert!(matches!(err, ClientError::TruncatedHeader));
    }

    #[test]
    fn perform_resets_prior_accounting() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Answers the same handle twice.
        let server = thread::spawn(move || {
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = vec![0u8; 512];
                let mut len = 0;
                while codec::find_terminator(&request[..len]).is_none() {
                    let n = stream.read(&mut request[len..]).unwrap();
                    assert!(n > 0);
                    len += n;
                }
                stream.write_all(b"GETFILE OK 5\r\n\r\nagain").unwrap();
            }
        });

        let mut transfer = Transfer::new("127.0.0.1", addr.port(), "/again");
        transfer.perform().unwrap();
        assert_eq!(transfer.status(), Status::Ok);
        assert_eq!(transfer.bytes_received(), 5);

        // A second perform starts the accounting over instead of summing.
        transfer.perform().unwrap();
        assert_eq!(transfer.bytes_received(), 5);

        server.join().unwrap();
    }

    #[test]
    fn connect_failure_reported() {
        // Bind then drop to find a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transfer = Transfer::new("127.0.0.1", port, "/x");
        let err = transfer.perform().unwrap_err();

        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
