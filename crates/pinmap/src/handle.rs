//! Handle over one pinned BPF map.
//!
//! ```text
//! Unbound --open ok--> Bound --close--> Closed --open ok--> Bound
//! Unbound --open fail--> Unbound        Closed --open fail / close--> Closed
//! Bound --lookup--> Bound
//! ```
//!
//! `open` and `close` take `&mut self`; `lookup` takes `&self`, so a bound
//! handle can be shared between threads for concurrent lookups.

use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::sys::linux::LinuxBpf;
use crate::sys::{BpfSyscalls, MapInfo};
use crate::{MapError, MapSchema, MapType, Result, cpu};

/// Lifecycle state of a [`PinnedMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    /// Never bound.
    Unbound,
    /// Holding a validated descriptor.
    Bound,
    /// Bound before, descriptor since released.
    Closed,
}

impl fmt::Display for MapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "unbound"),
            Self::Bound => write!(f, "bound"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug)]
struct Binding {
    fd: RawFd,
    path: PathBuf,
    real_value_size: u32,
}

/// Releases a descriptor on drop unless ownership is taken with
/// [`FdGuard::into_raw`].
struct FdGuard<'a, S: BpfSyscalls> {
    sys: &'a S,
    fd: RawFd,
}

impl<'a, S: BpfSyscalls> FdGuard<'a, S> {
    const fn new(sys: &'a S, fd: RawFd) -> Self {
        Self { sys, fd }
    }

    const fn fd(&self) -> RawFd {
        self.fd
    }

    fn into_raw(self) -> RawFd {
        let fd = self.fd;
        std::mem::forget(self);
        fd
    }
}

impl<S: BpfSyscalls> Drop for FdGuard<'_, S> {
    fn drop(&mut self) {
        self.sys.close(self.fd);
    }
}

/// Read-only handle over a BPF map pinned by another process.
///
/// The schema is fixed at construction. [`open`](Self::open) attaches to a
/// pinned map and checks it against the schema; [`lookup`](Self::lookup)
/// copies values out. The descriptor is released by
/// [`close`](Self::close) or on drop.
pub struct PinnedMap<S: BpfSyscalls> {
    schema: MapSchema,
    sys: S,
    binding: Option<Binding>,
    was_bound: bool,
}

impl PinnedMap<LinuxBpf> {
    /// Unbound handle using the `bpf(2)` backend.
    pub fn new(schema: MapSchema) -> Self {
        Self::with_backend(schema, LinuxBpf::new())
    }
}

impl<S: BpfSyscalls> PinnedMap<S> {
    /// Unbound handle using `sys` for kernel access.
    ///
    /// No kernel interaction happens here. The schema's
    /// `max_value_size` defaulting rule is applied.
    pub fn with_backend(schema: MapSchema, sys: S) -> Self {
        Self {
            schema: schema.normalized(),
            sys,
            binding: None,
            was_bound: false,
        }
    }

    /// Unbound handle built from individual schema fields.
    ///
    /// A `max_value_size` of 0 means "same as `min_value_size`".
    pub fn from_parts(
        sys: S,
        map_type: MapType,
        key_size: u32,
        min_value_size: u32,
        max_value_size: u32,
    ) -> Self {
        Self::with_backend(
            MapSchema::new(map_type, key_size, min_value_size, max_value_size),
            sys,
        )
    }

    /// Attach to the map pinned at `path`.
    ///
    /// Any descriptor already held is released first. Returns `false` and
    /// logs the cause if the object cannot be opened or does not match the
    /// schema; the handle then holds no descriptor.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> bool {
        let path = path.as_ref();
        self.close();

        match self.bind(path) {
            Ok(binding) => {
                debug!(
                    path = %path.display(),
                    fd = binding.fd,
                    map_type = %self.schema.map_type,
                    real_value_size = binding.real_value_size,
                    "opened pinned BPF map"
                );
                self.binding = Some(binding);
                self.was_bound = true;
                true
            }
            Err(e) => {
                warn!(
                    op = "open",
                    path = %path.display(),
                    error = %e,
                    "cannot open pinned BPF map"
                );
                false
            }
        }
    }

    fn bind(&self, path: &Path) -> Result<Binding> {
        if path.as_os_str().is_empty() {
            return Err(MapError::InvalidPath(path.to_path_buf()));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| MapError::InvalidPath(path.to_path_buf()))?;

        let fd = self
            .sys
            .obj_get(&c_path)
            .map_err(|source| MapError::ObjGet {
                path: path.to_path_buf(),
                source,
            })?;
        let guard = FdGuard::new(&self.sys, fd);

        let info = self.sys.map_info(guard.fd())?;
        let real_value_size = self.validate(&info)?;

        Ok(Binding {
            fd: guard.into_raw(),
            path: path.to_path_buf(),
            real_value_size,
        })
    }

    /// Check reported metadata against the schema and resolve the number
    /// of bytes a lookup writes.
    fn validate(&self, info: &MapInfo) -> Result<u32> {
        let schema = &self.schema;
        if !schema.map_type.accepts(info.map_type) {
            return Err(MapError::TypeMismatch {
                expected: schema.map_type,
                found: info.map_type,
            });
        }
        if info.key_size != schema.key_size {
            return Err(MapError::KeySizeMismatch {
                expected: schema.key_size,
                found: info.key_size,
            });
        }

        let real = if schema.map_type.is_per_cpu() {
            let cpus = self.sys.possible_cpus()?;
            cpu::per_cpu_value_size(info.value_size, cpus).unwrap_or(u64::MAX)
        } else {
            u64::from(info.value_size)
        };

        if !schema.admits_value_size(real) {
            return Err(MapError::ValueSizeOutOfRange {
                real,
                min: schema.min_value_size,
                max: schema.max_value_size,
            });
        }
        // Bounded by max_value_size
        Ok(real as u32)
    }

    /// Look up `key`, copying the value into the front of `value`.
    ///
    /// `key` must be `key_size` bytes and `value` at least `max_value_size`
    /// bytes. On success exactly `real_value_size` bytes are written; the
    /// rest of `value` is untouched. Only the first `min_value_size` bytes
    /// carry a schema-defined meaning.
    ///
    /// Returns `false` on a miss or on any failure, including an unbound
    /// handle.
    pub fn lookup(&self, key: &[u8], value: &mut [u8]) -> bool {
        match self.try_lookup(key, value) {
            Ok(()) => true,
            Err(MapError::NotFound) => {
                trace!(op = "lookup", path = ?self.path(), "no entry for key");
                false
            }
            Err(e) => {
                debug!(op = "lookup", path = ?self.path(), error = %e, "BPF map lookup failed");
                false
            }
        }
    }

    fn try_lookup(&self, key: &[u8], value: &mut [u8]) -> Result<()> {
        let binding = self.binding.as_ref().ok_or(MapError::NotOpen)?;
        if key.len() != self.schema.key_size as usize {
            return Err(MapError::KeyLength {
                expected: self.schema.key_size,
                actual: key.len(),
            });
        }
        if value.len() < self.schema.max_value_size as usize {
            return Err(MapError::BufferTooSmall {
                required: self.schema.max_value_size,
                actual: value.len(),
            });
        }

        // SAFETY: `value` holds at least max_value_size bytes and the
        // kernel writes real_value_size <= max_value_size, checked in
        // `validate`.
        #[allow(unsafe_code)]
        let result = unsafe { self.sys.map_lookup_elem(binding.fd, key, value) };

        result.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MapError::NotFound,
            _ => MapError::Syscall {
                op: "BPF_MAP_LOOKUP_ELEM",
                source: e,
            },
        })
    }

    /// Look up `key` into a fresh buffer.
    ///
    /// Returns the `real_value_size` bytes the kernel wrote.
    pub fn lookup_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        let real = self.real_value_size()?;
        let mut value = vec![0u8; self.schema.max_value_size as usize];
        if !self.lookup(key, &mut value) {
            return None;
        }
        value.truncate(real as usize);
        Some(value)
    }

    /// Release the descriptor, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(binding) = self.binding.take() {
            trace!(path = %binding.path.display(), fd = binding.fd, "closing BPF map");
            self.sys.close(binding.fd);
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> MapState {
        match (&self.binding, self.was_bound) {
            (Some(_), _) => MapState::Bound,
            (None, true) => MapState::Closed,
            (None, false) => MapState::Unbound,
        }
    }

    /// Whether a descriptor is held.
    pub const fn is_open(&self) -> bool {
        self.binding.is_some()
    }

    /// Schema the handle was built with.
    pub const fn schema(&self) -> &MapSchema {
        &self.schema
    }

    /// Expected map kind.
    pub const fn map_type(&self) -> MapType {
        self.schema.map_type
    }

    /// Key length in bytes.
    pub const fn key_size(&self) -> u32 {
        self.schema.key_size
    }

    /// Meaningful value prefix in bytes.
    pub const fn min_value_size(&self) -> u32 {
        self.schema.min_value_size
    }

    /// Output buffer length lookups require.
    pub const fn max_value_size(&self) -> u32 {
        self.schema.max_value_size
    }

    /// Bytes a lookup writes, known once bound.
    pub fn real_value_size(&self) -> Option<u32> {
        self.binding.as_ref().map(|b| b.real_value_size)
    }

    /// Path of the bound map.
    pub fn path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.path.as_path())
    }

    /// Kernel backend.
    pub const fn backend(&self) -> &S {
        &self.sys
    }
}

impl<S: BpfSyscalls> Drop for PinnedMap<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: BpfSyscalls> fmt::Debug for PinnedMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedMap")
            .field("schema", &self.schema)
            .field("state", &self.state())
            .field("path", &self.path())
            .field("real_value_size", &self.real_value_size())
            .finish_non_exhaustive()
    }
}
