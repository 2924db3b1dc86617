use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::error::Result;
use crate::icmp::IpVersion;
use crate::socket::{IcmpSocket, SocketFactory};

// Outbound packets rotate over this many write sockets per target to spread
// them across separate OS socket buffers.
const SOCKET_POOL_SIZE: usize = 10;

/// One probing destination registered with an engine.
///
/// Each target carries a pseudo-random non-zero 16-bit identifier stamped
/// into its echo requests; together with the per-cycle sequence number it
/// forms the key replies are correlated by.
pub struct PingTarget {
    host_address: Mutex<IpAddr>,
    version: IpVersion,
    ttl: u8,
    id: u16,
    pool: Mutex<SocketPool>,
    user_data: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

struct SocketPool {
    slots: Vec<Option<Arc<dyn IcmpSocket>>>,
    current: usize,
}

impl PingTarget {
    pub(crate) fn new(host_address: IpAddr, ttl: u8) -> Self {
        let version = match host_address {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        };
        PingTarget {
            host_address: Mutex::new(host_address),
            version,
            ttl,
            id: rand::thread_rng().gen_range(1..=u16::MAX),
            pool: Mutex::new(SocketPool {
                slots: vec![None; SOCKET_POOL_SIZE],
                current: 0,
            }),
            user_data: Mutex::new(None),
        }
    }

    /// Stable per-target identifier, non-zero.
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[must_use]
    pub fn host_address(&self) -> IpAddr {
        *self.host_address.lock()
    }

    pub fn set_host_address(&self, host_address: IpAddr) {
        *self.host_address.lock() = host_address;
    }

    /// Configured TTL; 0 means the OS default is used.
    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[must_use]
    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_data.lock().clone()
    }

    /// Attach opaque caller bookkeeping, e.g. a link back to a UI row.
    pub fn set_user_data(&self, data: Option<Arc<dyn Any + Send + Sync>>) {
        *self.user_data.lock() = data;
    }

    /// The next write socket from the rotating pool, created through
    /// `factory` on first use of each slot.
    pub(crate) fn socket(&self, factory: &dyn SocketFactory) -> Result<Arc<dyn IcmpSocket>> {
        let mut pool = self.pool.lock();
        let slot = pool.current;
        if pool.slots[slot].is_none() {
            pool.slots[slot] = Some(factory.write_socket(self.version, self.ttl)?);
        }
        let socket = pool.slots[slot]
            .as_ref()
            .map(Arc::clone)
            .expect("socket pool slot filled above");
        pool.current = (slot + 1) % pool.slots.len();
        Ok(socket)
    }
}

impl fmt::Debug for PingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PingTarget")
            .field("host_address", &self.host_address())
            .field("id", &self.id)
            .field("ttl", &self.ttl)
            .finish()
    }
}
