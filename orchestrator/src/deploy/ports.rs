//! Host port allocation

use std::sync::atomic::{AtomicU32, Ordering};

use crate::errors::CloudlabError;

/// First host port handed out when nothing else is configured
pub const DEFAULT_PORT_BASE: u16 = 9000;

/// Hands out strictly increasing host ports, never reusing one
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU32,
}

impl PortAllocator {
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU32::new(u32::from(base)),
        }
    }

    /// Reserve the next port
    pub fn next(&self) -> Result<u16, CloudlabError> {
        let candidate = self.next.fetch_add(1, Ordering::SeqCst);
        u16::try_from(candidate).map_err(|_| CloudlabError::PortsExhausted(candidate))
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ports_increase_from_base() {
        let ports = PortAllocator::default();
        assert_eq!(ports.next().unwrap(), 9000);
        assert_eq!(ports.next().unwrap(), 9001);
        assert_eq!(ports.next().unwrap(), 9002);
    }

    #[test]
    fn test_ports_exhausted() {
        let ports = PortAllocator::new(u16::MAX);
        assert_eq!(ports.next().unwrap(), u16::MAX);
        assert!(matches!(ports.next(), Err(CloudlabError::PortsExhausted(65536))));
        assert!(ports.next().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_is_unique() {
        let ports = Arc::new(PortAllocator::new(20000));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let ports = ports.clone();
                tokio::spawn(async move { ports.next().unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()));
        }
        assert_eq!(seen.len(), 64);
    }
}
