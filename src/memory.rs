//! Process memory introspection.
//!
//! Heap usage comes from [`TrackingAllocator`], a counting wrapper around the
//! system allocator that the binary installs with `#[global_allocator]`. Resident
//! set size is read from procfs. The reclaim hint maps to glibc's `malloc_trim`,
//! which hands freed arenas back to the OS so RSS readings start from a
//! comparable baseline.
//!
//! The sampler is an explicit collaborator of the runner so tests can swap in
//! [`ScriptedSampler`].

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::VecDeque;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static HEAP_LIVE: AtomicU64 = AtomicU64::new(0);
static ALLOC_CALLS: AtomicU64 = AtomicU64::new(0);

/// Global allocator wrapper tracking live heap bytes.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            HEAP_LIVE.fetch_add(layout.size() as u64, Ordering::Relaxed);
            ALLOC_CALLS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            HEAP_LIVE.fetch_add(layout.size() as u64, Ordering::Relaxed);
            ALLOC_CALLS.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        HEAP_LIVE.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            let old = layout.size() as u64;
            let new = new_size as u64;
            if new >= old {
                HEAP_LIVE.fetch_add(new - old, Ordering::Relaxed);
            } else {
                HEAP_LIVE.fetch_sub(old - new, Ordering::Relaxed);
            }
            ALLOC_CALLS.fetch_add(1, Ordering::Relaxed);
        }
        new_ptr
    }
}

impl TrackingAllocator {
    /// Live heap bytes as seen by the allocator; 0 when it is not installed.
    pub fn live_bytes() -> u64 {
        HEAP_LIVE.load(Ordering::Relaxed)
    }

    /// Whether this allocator is the process-wide `#[global_allocator]`.
    pub fn is_installed() -> bool {
        let before = ALLOC_CALLS.load(Ordering::Relaxed);
        let probe = black_box(Box::new([0u8; 64]));
        let after = ALLOC_CALLS.load(Ordering::Relaxed);
        drop(probe);
        after > before
    }
}

/// Point-in-time process memory reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub heap_used_bytes: u64,
    pub resident_set_bytes: u64,
}

/// Whether the environment can honor a reclaim request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimSupport {
    Available,
    Unsupported,
}

/// Source of memory snapshots, plus an optional reclaim hint.
pub trait MemorySampler {
    fn snapshot(&mut self) -> MemorySnapshot;

    /// Fixed for the sampler's lifetime.
    fn reclaim_support(&self) -> ReclaimSupport;

    /// Ask the allocator to release freed memory. No-op when unsupported.
    fn force_reclaim(&mut self);
}

/// Heap growth between two snapshots, clamped at zero.
///
/// A reclaim that lands mid-iteration can make `after < before`; that is not
/// negative allocation and is reported as 0.
pub fn clamp_delta(before: &MemorySnapshot, after: &MemorySnapshot) -> u64 {
    after.heap_used_bytes.saturating_sub(before.heap_used_bytes)
}

/// Sampler backed by the real process.
#[derive(Debug)]
pub struct ProcessSampler {
    reclaim: ReclaimSupport,
    heap_tracking: bool,
}

impl ProcessSampler {
    /// Probe the environment once and log what is available.
    pub fn detect() -> Self {
        let reclaim = if cfg!(all(target_os = "linux", target_env = "gnu")) {
            ReclaimSupport::Available
        } else {
            ReclaimSupport::Unsupported
        };
        let heap_tracking = TrackingAllocator::is_installed();

        match reclaim {
            ReclaimSupport::Available => tracing::info!("reclaim hint available (malloc_trim)"),
            ReclaimSupport::Unsupported => tracing::warn!(
                "reclaim hint unsupported on this platform; memory figures will be noisier"
            ),
        }
        if !heap_tracking {
            tracing::warn!("tracking allocator not installed; heap figures will read as 0");
        }

        Self {
            reclaim,
            heap_tracking,
        }
    }

    pub fn heap_tracking(&self) -> bool {
        self.heap_tracking
    }
}

impl MemorySampler for ProcessSampler {
    fn snapshot(&mut self) -> MemorySnapshot {
        MemorySnapshot {
            heap_used_bytes: TrackingAllocator::live_bytes(),
            resident_set_bytes: resident_set_bytes().unwrap_or(0),
        }
    }

    fn reclaim_support(&self) -> ReclaimSupport {
        self.reclaim
    }

    fn force_reclaim(&mut self) {
        if self.reclaim == ReclaimSupport::Available {
            trim_heap();
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_heap() {
    // SAFETY: malloc_trim only walks glibc's own arenas and has no preconditions.
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_heap() {}

/// Parse `VmRSS` out of `/proc/self/status`.
#[cfg(target_os = "linux")]
fn resident_set_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn resident_set_bytes() -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kb * 1024)
}

/// Test double replaying scripted snapshots.
///
/// Once the script runs out the last snapshot is repeated.
#[derive(Debug, Clone)]
pub struct ScriptedSampler {
    script: VecDeque<MemorySnapshot>,
    last: MemorySnapshot,
    reclaim: ReclaimSupport,
    pub reclaim_calls: u64,
    pub snapshot_calls: u64,
}

impl ScriptedSampler {
    pub fn new(script: impl IntoIterator<Item = MemorySnapshot>, reclaim: ReclaimSupport) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: MemorySnapshot::default(),
            reclaim,
            reclaim_calls: 0,
            snapshot_calls: 0,
        }
    }

    /// Sampler that always reads zero.
    pub fn flat(reclaim: ReclaimSupport) -> Self {
        Self::new(std::iter::empty(), reclaim)
    }

    /// Build a script from `(heap, rss)` pairs.
    pub fn from_pairs(pairs: &[(u64, u64)], reclaim: ReclaimSupport) -> Self {
        Self::new(
            pairs.iter().map(|&(heap, rss)| MemorySnapshot {
                heap_used_bytes: heap,
                resident_set_bytes: rss,
            }),
            reclaim,
        )
    }
}

impl MemorySampler for ScriptedSampler {
    fn snapshot(&mut self) -> MemorySnapshot {
        self.snapshot_calls += 1;
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last
    }

    fn reclaim_support(&self) -> ReclaimSupport {
        self.reclaim
    }

    fn force_reclaim(&mut self) {
        if self.reclaim == ReclaimSupport::Available {
            self.reclaim_calls += 1;
        }
    }
}
