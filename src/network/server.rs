//! TCP Server
//!
//! Accepts connections and dispatches to worker threads.
//!
//! ```text
//! accept ─► socket options ─► rate limit ─► worker queue ─► Connection::handle
//!                                 │                 │
//!                                 └─ 429            └─ 503 when the queue stays full
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use socket2::SockRef;

use super::connection::Connection;
use super::rate_limiter::RateLimiter;
use super::thread_pool::ThreadPool;
use crate::api::{Router, ServerContext};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::{AtlasError, Result};
use crate::protocol::HttpResponse;

/// Consecutive accept failures tolerated before pausing
const ACCEPT_ERROR_BURST: u32 = 10;

/// Pause after a burst of accept failures
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(10);

/// Pause after running out of descriptors or memory
const RESOURCE_BACKOFF: Duration = Duration::from_millis(100);

/// How long the accept loop waits for queue space
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// HTTP server for AtlasDB
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Arc<Router>,
    limiter: Arc<RateLimiter>,
    pool: ThreadPool,
    running: Arc<AtomicBool>,
}

/// Stops a running server from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Clear the running flag and wake the accept loop
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // accept() only returns on a connection
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1)) {
            tracing::debug!("Shutdown wake-up connect failed: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Server {
    /// Bind the listening socket and start the workers. A bind failure is
    /// returned to the caller, which should treat it as fatal.
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr()).map_err(|e| {
            tracing::error!("Failed to bind {}: {}", config.bind_addr(), e);
            AtlasError::Io(e)
        })?;
        let local_addr = listener.local_addr()?;

        let pool = ThreadPool::new(config.worker_threads, config.queue_capacity, SUBMIT_TIMEOUT)?;
        let router = Arc::new(Router::new(ServerContext::new(engine)));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            config,
            listener,
            local_addr,
            router,
            limiter,
            pool,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            wake_addr: wake_addr(self.local_addr),
        }
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        let mut consecutive_errors = 0u32;

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    consecutive_errors = 0;
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.dispatch(stream, peer);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if is_resource_exhaustion(&e) {
                        tracing::warn!("Accept failed, out of resources: {}", e);
                        thread::sleep(RESOURCE_BACKOFF);
                    } else {
                        tracing::debug!("Accept failed: {}", e);
                        if consecutive_errors >= ACCEPT_ERROR_BURST {
                            thread::sleep(ACCEPT_ERROR_PAUSE);
                            consecutive_errors = 0;
                        }
                    }
                }
            }
        }

        tracing::info!("Shutting down, waiting for workers");
        self.pool.shutdown();
        self.router.context().engine.close();
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Configure the socket and hand the connection to a worker
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_socket(&stream) {
            tracing::debug!("Could not configure socket for {}: {}", peer, e);
        }

        let limited = !self.limiter.check(peer.ip());
        let mut connection = match Connection::new(stream, Arc::clone(&self.router), self.config.max_body_bytes) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Dropping connection from {}: {}", peer, e);
                return;
            }
        };
        if let Err(e) = connection.set_timeouts(
            Duration::from_millis(self.config.read_timeout_ms),
            Duration::from_millis(self.config.write_timeout_ms),
        ) {
            tracing::debug!("Could not set timeouts for {}: {}", peer, e);
        }

        // Second handle on the socket, to answer 503 if no worker takes the job
        let stream_for_busy = connection.try_clone_stream().ok();
        let submitted = self.pool.submit(move || {
            let result = if limited {
                connection.reject(HttpResponse::too_many_requests())
            } else {
                connection.handle()
            };
            if let Err(e) = result {
                tracing::debug!("Connection {} ended with error: {}", connection.peer_addr(), e);
            }
        });

        if let Err(e) = submitted {
            tracing::warn!("Rejecting {}: {}", peer, e);
            if let Some(stream) = stream_for_busy {
                let _ = crate::protocol::write_response(&mut &stream, &HttpResponse::service_unavailable());
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.pool.shutdown();
    }
}

// =============================================================================
// Socket Helpers
// =============================================================================

fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    // Disable Nagle's algorithm for low latency
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)
}

/// Out of file descriptors or memory
fn is_resource_exhaustion(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOMEM) | Some(libc::ENOBUFS)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Address the shutdown handle connects to; wildcard binds map to loopback
fn wake_addr(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}
