/*!
 * Host Memory Probe
 * Optional read-only source of host-reported memory usage
 *
 * Capability-gated: the variant is selected once at startup. When the
 * platform offers no introspection the probe reports structurally absent
 * data, never zero.
 */

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Host-reported memory usage at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapReading {
    /// Resident memory of this process in bytes
    pub used_bytes: u64,
    /// Total memory of the host in bytes
    pub total_bytes: u64,
}

/// Read-only source of host memory statistics
pub trait HostMemoryProbe: Send + Sync {
    /// Current host reading, or `None` when the capability is absent.
    fn read(&self) -> Option<HeapReading>;
}

/// Probe backed by the platform's process table via sysinfo.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Pid,
    total_bytes: u64,
}

impl SysinfoProbe {
    /// Attach to the current process, or `None` when the platform is
    /// unsupported.
    pub fn attach() -> Option<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return None;
        }
        let pid = get_current_pid().ok()?;

        let mut system = System::new();
        system.refresh_memory();
        let total_bytes = system.total_memory();

        Some(Self {
            system: Mutex::new(system),
            pid,
            total_bytes,
        })
    }
}

impl HostMemoryProbe for SysinfoProbe {
    fn read(&self) -> Option<HeapReading> {
        let mut system = self.system.lock();
        // Refresh only this process, memory fields only
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        let used_bytes = system.process(self.pid)?.memory();

        Some(HeapReading {
            used_bytes,
            total_bytes: self.total_bytes,
        })
    }
}

/// Probe for platforms without memory introspection; always reports absent.
pub struct UnavailableProbe;

impl HostMemoryProbe for UnavailableProbe {
    fn read(&self) -> Option<HeapReading> {
        None
    }
}

/// Select the probe variant for this platform. Called once at startup.
pub fn detect() -> Arc<dyn HostMemoryProbe> {
    match SysinfoProbe::attach() {
        Some(probe) => {
            info!(
                "Host memory probe attached ({} bytes total host memory)",
                probe.total_bytes
            );
            Arc::new(probe)
        }
        None => {
            warn!("Host memory introspection unavailable on this platform");
            Arc::new(UnavailableProbe)
        }
    }
}
