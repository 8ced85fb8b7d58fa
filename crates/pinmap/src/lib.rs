//! Read-only handle over BPF maps pinned in the BPF filesystem.
//!
//! A privileged agent creates a BPF map and pins it under `/sys/fs/bpf`.
//! Other processes attach to the pinned object with `BPF_OBJ_GET` and
//! perform point lookups with `BPF_MAP_LOOKUP_ELEM`. This crate provides
//! the attaching side: [`PinnedMap`] checks that the map the kernel reports
//! matches the schema the caller expects, then copies values out on lookup.
//!
//! The handle never creates, updates or deletes maps.
//!
//! # Value sizes
//!
//! Per-CPU maps hand back one value slot per possible CPU, each rounded up
//! to 8 bytes. The number of CPUs is only known at runtime, so a
//! [`MapSchema`] carries a value size *range*: `min_value_size` is the
//! meaningful prefix, `max_value_size` is the buffer the caller provides.
//! The exact size the kernel writes (`real_value_size`) is resolved when
//! the map is opened.
//!
//! # Failure reporting
//!
//! [`PinnedMap::open`] and [`PinnedMap::lookup`] return `bool`. Failures are
//! logged through `tracing` with the operation, the path and the cause; a
//! missed key is an ordinary `false`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pinmap::{MapSchema, MapType, PinnedMap};
//!
//! let mut map = PinnedMap::new(MapSchema::exact(MapType::Hash, 4, 8));
//! if map.open("/sys/fs/bpf/tc/globals/example") {
//!     let mut value = [0u8; 8];
//!     if map.lookup(&1u32.to_ne_bytes(), &mut value) {
//!         println!("value: {value:?}");
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// BPF maps, bpffs pins and the bpf(2) system call exist only on Linux.
#[cfg(not(target_os = "linux"))]
compile_error!("pinmap supports Linux only");

use std::path::PathBuf;

use thiserror::Error;

// Map schema and host filesystem locations
pub mod config;

// Possible-CPU topology
pub mod cpu;

// /proc/self/fdinfo parsing
pub mod fdinfo;

// Map handle
pub mod handle;

// Kernel map kinds
pub mod map_type;

// bpf(2) plumbing
pub mod sys;

pub use config::{HostPaths, MapSchema};
pub use handle::{MapState, PinnedMap};
pub use map_type::MapType;
pub use sys::linux::LinuxBpf;
pub use sys::{BpfSyscalls, MapInfo};

/// Result type for map operations.
pub type Result<T> = std::result::Result<T, MapError>;

/// Causes of a failed open or lookup.
///
/// The public handle API reports failures as `bool`; these are the
/// causes written to the log alongside.
#[derive(Debug, Error)]
pub enum MapError {
    /// The path cannot name a pinned object.
    #[error("invalid map path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// `BPF_OBJ_GET` failed (missing object, permissions, fd limits).
    #[error("BPF_OBJ_GET failed for {}: {source}", .path.display())]
    ObjGet {
        /// Path of the pinned object.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Map metadata could not be read or parsed.
    #[error("map metadata unavailable: {0}")]
    Metadata(String),

    /// The kernel reports a different map type.
    #[error("map type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type declared by the handle.
        expected: MapType,
        /// Raw type reported by the kernel.
        found: u32,
    },

    /// The kernel reports a different key size.
    #[error("key size mismatch: expected {expected}, found {found}")]
    KeySizeMismatch {
        /// Key size declared by the handle.
        expected: u32,
        /// Key size reported by the kernel.
        found: u32,
    },

    /// The value size the kernel writes is outside the accepted range.
    #[error("value size {real} outside accepted range [{min}, {max}]")]
    ValueSizeOutOfRange {
        /// Size the kernel would write on lookup.
        real: u64,
        /// Declared minimum value size.
        min: u32,
        /// Declared maximum value size.
        max: u32,
    },

    /// The handle holds no descriptor.
    #[error("map is not open")]
    NotOpen,

    /// Lookup key has the wrong length.
    #[error("key is {actual} bytes, map expects {expected}")]
    KeyLength {
        /// Declared key size.
        expected: u32,
        /// Length of the supplied key.
        actual: usize,
    },

    /// Output buffer is shorter than `max_value_size`.
    #[error("value buffer is {actual} bytes, map requires {required}")]
    BufferTooSmall {
        /// Declared maximum value size.
        required: u32,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// No entry exists for the key.
    #[error("no entry for key")]
    NotFound,

    /// A bpf(2) command failed.
    #[error("{op} failed: {source}")]
    Syscall {
        /// Command name.
        op: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The possible-CPU list could not be determined.
    #[error("cannot determine possible CPUs: {0}")]
    CpuTopology(String),
}

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default mount point of the BPF filesystem.
pub const DEFAULT_BPF_FS_ROOT: &str = "/sys/fs/bpf";

/// Default procfs mount point.
pub const DEFAULT_PROCFS_ROOT: &str = "/proc";

/// Default location of the possible-CPU range list.
pub const DEFAULT_CPU_POSSIBLE_PATH: &str = "/sys/devices/system/cpu/possible";

/// Alignment of each per-CPU value slot.
pub const PERCPU_VALUE_ALIGN: u64 = 8;
