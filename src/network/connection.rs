//! Connection Handler
//!
//! Handles individual client connections: read one request, route it,
//! write one response, close.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::api::Router;
use crate::error::{AtlasError, Result};
use crate::protocol::{read_request, write_response, HttpResponse};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared route table
    router: Arc<Router>,

    /// Largest accepted request body
    max_body: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O
    pub fn new(stream: TcpStream, router: Arc<Router>, max_body: usize) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            router,
            max_body,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        if !read.is_zero() {
            self.reader.get_ref().set_read_timeout(Some(read))?;
        }
        if !write.is_zero() {
            self.writer.get_ref().set_write_timeout(Some(write))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until the response is written)
    pub fn handle(&mut self) -> Result<()> {
        tracing::trace!("Connection established from {}", self.peer_addr);

        let request = match read_request(&mut self.reader, self.max_body) {
            Ok(request) => request,
            Err(AtlasError::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Client connected and left without sending anything
                tracing::debug!("Client {} disconnected", self.peer_addr);
                return Ok(());
            }
            Err(AtlasError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                tracing::debug!("Connection reset by client {}", self.peer_addr);
                return Ok(());
            }
            Err(AtlasError::Io(ref e))
                if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
            {
                // Read timeout (Windows uses TimedOut instead of WouldBlock)
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                return Ok(());
            }
            Err(e @ AtlasError::Protocol(_)) => {
                tracing::debug!("Bad request from {}: {}", self.peer_addr, e);
                return self.send_response(HttpResponse::error(400, e.to_string()));
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                let _ = self.send_response(HttpResponse::internal_error());
                return Err(e);
            }
        };

        tracing::debug!("{} {} from {}", request.method, request.path, self.peer_addr);

        let response = self.router.dispatch(&request);
        self.send_response(response)
    }

    /// Read and discard the request, then answer with `response` without
    /// routing it (rate-limited clients)
    pub fn reject(&mut self, response: HttpResponse) -> Result<()> {
        if let Err(e) = read_request(&mut self.reader, self.max_body) {
            tracing::trace!("Discarding unreadable request from {}: {}", self.peer_addr, e);
        }
        self.send_response(response)
    }

    /// Send a response to the client
    pub fn send_response(&mut self, response: HttpResponse) -> Result<()> {
        match write_response(&mut self.writer, &response) {
            Ok(()) => Ok(()),
            // The client disconnected before we could send the response
            Err(AtlasError::Io(ref e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::BrokenPipe
                ) =>
            {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr,
                    e
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                Err(e)
            }
        }
    }

    /// Another handle on the underlying socket
    pub fn try_clone_stream(&self) -> Result<TcpStream> {
        Ok(self.writer.get_ref().try_clone()?)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
