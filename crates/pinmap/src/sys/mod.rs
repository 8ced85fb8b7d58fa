//! bpf(2) plumbing.
//!
//! [`BpfSyscalls`] is the boundary between [`PinnedMap`](crate::PinnedMap)
//! and the kernel. The real backend lives in [`linux`]; [`fake`] is an
//! in-memory kernel for tests.
//!
//! ## Layout
//!
//! - [`attr`]: fixed-layout `bpf_attr` command records
//! - [`linux`]: `syscall(SYS_bpf, ...)` and `close(2)` through `libc`
//! - [`fake`]: pinned maps held in a hash table (feature `test-util`)

pub mod attr;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod linux;

use std::ffi::CStr;
use std::io;
use std::os::unix::io::RawFd;

use crate::Result;

/// Metadata the kernel reports for an open map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapInfo {
    /// Raw `bpf_map_type` value.
    pub map_type: u32,
    /// Key size in bytes.
    pub key_size: u32,
    /// Value size in bytes, per CPU for per-CPU maps.
    pub value_size: u32,
    /// Capacity the map was created with.
    pub max_entries: u32,
    /// Creation flags.
    pub map_flags: u32,
}

/// Kernel operations a map handle needs.
///
/// Implementations perform blocking calls and keep no per-descriptor
/// state the handle relies on; descriptors are owned by the caller.
pub trait BpfSyscalls {
    /// `BPF_OBJ_GET`: obtain a descriptor for the object pinned at `path`.
    fn obj_get(&self, path: &CStr) -> io::Result<RawFd>;

    /// Report type, key size and value size of the map behind `fd`.
    fn map_info(&self, fd: RawFd) -> Result<MapInfo>;

    /// Number of possible CPUs, used to size per-CPU values.
    fn possible_cpus(&self) -> Result<u32>;

    /// `BPF_MAP_LOOKUP_ELEM`: copy the value stored under `key` into
    /// `value`.
    ///
    /// A missing entry is reported as `ErrorKind::NotFound` (`ENOENT`).
    ///
    /// # Safety
    ///
    /// The kernel writes as many bytes as the map's lookup size regardless
    /// of `value.len()`. The caller must ensure `value` is at least that
    /// long.
    #[allow(unsafe_code)]
    unsafe fn map_lookup_elem(&self, fd: RawFd, key: &[u8], value: &mut [u8]) -> io::Result<()>;

    /// Release `fd`. Called exactly once per descriptor from `obj_get`.
    fn close(&self, fd: RawFd);
}
