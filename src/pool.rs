//! Keep-alive connection pool, keyed by origin (scheme, host, port).
//!
//! Mirrors `cwh_pool_get`/`cwh_pool_return`/`cwh_pool_cleanup`'s
//! per-conn linked list, replacing the manual `last_used`/`next` fields
//! with a `VecDeque` per origin and eviction driven by `Instant` rather
//! than `time_t`. Reached only from the reactor thread that owns it, so
//! no internal locking is needed -- a second reactor wanting keep-alive
//! reuse should own its own `Pool`.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::reactor::RawFd;
use crate::transport::{TcpTransport, Transport};

#[cfg(feature = "tls")]
use crate::transport::tls::TlsTransport;

/// Transport held by a pooled connection. Plain TCP or (with the `tls`
/// feature) a completed TLS session -- the handshake already happened
/// before a connection is returned to the pool.
pub enum PooledTransport {
    Tcp(TcpTransport),
    #[cfg(feature = "tls")]
    Tls(TlsTransport),
}

impl Transport for PooledTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match *self {
            PooledTransport::Tcp(ref mut t) => t.read(buf),
            #[cfg(feature = "tls")]
            PooledTransport::Tls(ref mut t) => t.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match *self {
            PooledTransport::Tcp(ref mut t) => t.write(buf),
            #[cfg(feature = "tls")]
            PooledTransport::Tls(ref mut t) => t.write(buf),
        }
    }

    fn raw_fd(&self) -> RawFd {
        match *self {
            PooledTransport::Tcp(ref t) => t.raw_fd(),
            #[cfg(feature = "tls")]
            PooledTransport::Tls(ref t) => t.raw_fd(),
        }
    }

    fn is_ready(&self) -> bool {
        match *self {
            PooledTransport::Tcp(ref t) => t.is_ready(),
            #[cfg(feature = "tls")]
            PooledTransport::Tls(ref t) => t.is_ready(),
        }
    }
}

struct Idle {
    transport: PooledTransport,
    last_used: Instant,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Origin {
    pub scheme: &'static str,
    pub host: String,
    pub port: u16,
}

impl Origin {
    pub fn new(scheme: &'static str, host: &str, port: u16) -> Origin {
        Origin { scheme: scheme, host: host.to_string(), port: port }
    }
}

pub struct PoolConfig {
    /// Max idle connections kept across all origins; oldest overall is
    /// evicted on overflow.
    pub max_connections: usize,
    /// Idle connections older than this are dropped rather than reused.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> PoolConfig {
        PoolConfig {
            max_connections: 50,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Pool of idle, keep-alive connections, owned by the reactor thread
/// that drives the client. Not `Sync` by design (see module docs).
pub struct Pool {
    config: PoolConfig,
    origins: HashMap<Origin, VecDeque<Idle>>,
    count: usize,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Pool {
        Pool {
            config: config,
            origins: HashMap::new(),
            count: 0,
        }
    }

    /// Take the most recently used, still-fresh connection for `origin`,
    /// if one exists. Stale entries encountered along the way are
    /// dropped, not returned.
    pub fn get(&mut self, origin: &Origin) -> Option<PooledTransport> {
        let queue = self.origins.get_mut(origin)?;
        while let Some(idle) = queue.pop_back() {
            self.count -= 1;
            if idle.last_used.elapsed() < self.config.idle_timeout {
                return Some(idle.transport);
            }
        }
        None
    }

    /// Return a transport for reuse. Per §4.4, callers must not call
    /// this for a transport that saw `Connection: close` or an I/O
    /// error since its last use -- such transports should simply be
    /// dropped instead.
    pub fn put(&mut self, origin: Origin, transport: PooledTransport) {
        if self.config.max_connections == 0 {
            return;
        }
        if self.count >= self.config.max_connections {
            self.evict_oldest();
        }
        let queue = self.origins.entry(origin).or_insert_with(VecDeque::new);
        queue.push_back(Idle {
            transport: transport,
            last_used: Instant::now(),
        });
        self.count += 1;
    }

    /// Close idle connections past `idle_timeout`. Cheap to call
    /// periodically (e.g. from a reactor timer); `get` also self-cleans
    /// lazily, so calling this is an optimization, not a correctness
    /// requirement.
    pub fn cleanup(&mut self) {
        let timeout = self.config.idle_timeout;
        let mut removed = 0;
        self.origins.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|idle| idle.last_used.elapsed() < timeout);
            removed += before - queue.len();
            !queue.is_empty()
        });
        self.count -= removed;
    }

    fn evict_oldest(&mut self) {
        let oldest_origin = self
            .origins
            .iter()
            .filter_map(|(origin, queue)| queue.front().map(|idle| (origin.clone(), idle.last_used)))
            .min_by_key(|&(_, last_used)| last_used)
            .map(|(origin, _)| origin);
        if let Some(origin) = oldest_origin {
            if let Some(queue) = self.origins.get_mut(&origin) {
                queue.pop_front();
                self.count -= 1;
                if queue.is_empty() {
                    self.origins.remove(&origin);
                }
            }
        }
    }

    /// Drop every pooled connection, closing the underlying sockets.
    pub fn shutdown(&mut self) {
        self.origins.clear();
        self.count = 0;
    }

    /// Total number of idle connections currently pooled, across origins.
    pub fn idle_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;

    fn dummy_transport() -> PooledTransport {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        PooledTransport::Tcp(TcpTransport::from_stream(client).unwrap())
    }

    #[test]
    fn put_then_get_roundtrips() {
        let mut pool = Pool::new(PoolConfig::default());
        let origin = Origin::new("http", "example.com", 80);
        pool.put(origin.clone(), dummy_transport());
        assert_eq!(pool.idle_count(), 1);
        assert!(pool.get(&origin).is_some());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn get_on_empty_origin_returns_none() {
        let mut pool = Pool::new(PoolConfig::default());
        let origin = Origin::new("http", "nowhere.example", 80);
        assert!(pool.get(&origin).is_none());
    }

    #[test]
    fn evicts_oldest_across_origins_when_full() {
        let config = PoolConfig { max_connections: 1, idle_timeout: Duration::from_secs(60) };
        let mut pool = Pool::new(config);
        let a = Origin::new("http", "a.example", 80);
        let b = Origin::new("http", "b.example", 80);
        pool.put(a.clone(), dummy_transport());
        pool.put(b.clone(), dummy_transport());
        assert_eq!(pool.idle_count(), 1);
        assert!(pool.get(&a).is_none());
        assert!(pool.get(&b).is_some());
    }

    #[test]
    fn expired_idle_connection_is_not_returned() {
        let config = PoolConfig { max_connections: 4, idle_timeout: Duration::from_millis(1) };
        let mut pool = Pool::new(config);
        let origin = Origin::new("http", "example.com", 80);
        pool.put(origin.clone(), dummy_transport());
        std::thread::sleep(Duration::from_millis(20));
        assert!(pool.get(&origin).is_none());
    }

    #[test]
    fn cleanup_drops_stale_entries() {
        let config = PoolConfig { max_connections: 4, idle_timeout: Duration::from_millis(1) };
        let mut pool = Pool::new(config);
        let origin = Origin::new("http", "example.com", 80);
        pool.put(origin.clone(), dummy_transport());
        std::thread::sleep(Duration::from_millis(20));
        pool.cleanup();
        assert_eq!(pool.idle_count(), 0);
    }
}
