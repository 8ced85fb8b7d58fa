//! In-memory kernel for tests.
//!
//! [`FakeKernel`] keeps pinned maps in a hash table keyed by path and hands
//! out descriptors the way the kernel does. Clones share state, so a test
//! can keep one clone to pin maps, mutate entries and inspect descriptor
//! bookkeeping while a handle owns another.

use std::collections::{HashMap, HashSet};
use std::ffi::CStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BpfSyscalls, MapInfo};
use crate::{MapError, MapType, Result};

/// A pinned map held by [`FakeKernel`].
#[derive(Debug, Clone, Default)]
pub struct FakeMap {
    /// Metadata reported for descriptors of this map.
    pub info: MapInfo,
    /// Stored entries. Values must already have the lookup size (per-CPU
    /// maps store all CPU slots back to back).
    pub entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl FakeMap {
    /// Empty map with the given shape.
    pub fn new(map_type: MapType, key_size: u32, value_size: u32) -> Self {
        Self::with_raw_type(map_type.as_raw(), key_size, value_size)
    }

    /// Empty map reporting an arbitrary raw type value.
    pub fn with_raw_type(map_type: u32, key_size: u32, value_size: u32) -> Self {
        Self {
            info: MapInfo {
                map_type,
                key_size,
                value_size,
                max_entries: 1024,
                map_flags: 0,
            },
            entries: HashMap::new(),
        }
    }

    /// Add an entry.
    #[must_use]
    pub fn with_entry(mut self, key: &[u8], value: &[u8]) -> Self {
        self.entries.insert(key.to_vec(), value.to_vec());
        self
    }
}

#[derive(Debug)]
struct State {
    pinned: HashMap<PathBuf, FakeMap>,
    open: HashMap<RawFd, PathBuf>,
    released: Vec<RawFd>,
    double_closes: usize,
    broken_metadata: HashSet<PathBuf>,
    lookup_errno: Option<i32>,
    cpus: u32,
    next_fd: RawFd,
}

/// Shared, thread-safe in-memory kernel.
#[derive(Debug, Clone)]
pub struct FakeKernel {
    state: Arc<Mutex<State>>,
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKernel {
    /// Kernel with no pinned maps and 4 possible CPUs.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                pinned: HashMap::new(),
                open: HashMap::new(),
                released: Vec::new(),
                double_closes: 0,
                broken_metadata: HashSet::new(),
                lookup_errno: None,
                cpus: 4,
                next_fd: 3,
            })),
        }
    }

    /// Pin `map` at `path`, replacing any map already there.
    pub fn pin<P: AsRef<Path>>(&self, path: P, map: FakeMap) {
        self.state
            .lock()
            .pinned
            .insert(path.as_ref().to_path_buf(), map);
    }

    /// Remove the pin at `path`. Descriptors opened on it stop resolving.
    pub fn unpin<P: AsRef<Path>>(&self, path: P) -> Option<FakeMap> {
        self.state.lock().pinned.remove(path.as_ref())
    }

    /// Insert or replace an entry, as the owning agent would.
    pub fn insert<P: AsRef<Path>>(&self, path: P, key: &[u8], value: &[u8]) {
        if let Some(map) = self.state.lock().pinned.get_mut(path.as_ref()) {
            map.entries.insert(key.to_vec(), value.to_vec());
        }
    }

    /// Remove an entry, as the owning agent would.
    pub fn remove<P: AsRef<Path>>(&self, path: P, key: &[u8]) {
        if let Some(map) = self.state.lock().pinned.get_mut(path.as_ref()) {
            map.entries.remove(key);
        }
    }

    /// Set the possible CPU count.
    pub fn set_possible_cpus(&self, cpus: u32) {
        self.state.lock().cpus = cpus;
    }

    /// Make metadata queries for descriptors of `path` fail.
    pub fn break_metadata<P: AsRef<Path>>(&self, path: P) {
        self.state
            .lock()
            .broken_metadata
            .insert(path.as_ref().to_path_buf());
    }

    /// Make every lookup fail with `errno`, or restore normal lookups.
    pub fn fail_lookups(&self, errno: Option<i32>) {
        self.state.lock().lookup_errno = errno;
    }

    /// Number of descriptors currently open.
    pub fn open_descriptors(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Descriptors released so far, in order.
    pub fn released_descriptors(&self) -> Vec<RawFd> {
        self.state.lock().released.clone()
    }

    /// Number of `close` calls on descriptors that were not open.
    pub fn double_closes(&self) -> usize {
        self.state.lock().double_closes
    }
}

impl BpfSyscalls for FakeKernel {
    fn obj_get(&self, path: &CStr) -> io::Result<RawFd> {
        let path = Path::new(std::ffi::OsStr::from_bytes(path.to_bytes()));
        let mut state = self.state.lock();
        if !state.pinned.contains_key(path) {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }
        let fd = state.next_fd;
        state.next_fd += 1;
        state.open.insert(fd, path.to_path_buf());
        Ok(fd)
    }

    fn map_info(&self, fd: RawFd) -> Result<MapInfo> {
        let state = self.state.lock();
        let path = state
            .open
            .get(&fd)
            .ok_or_else(|| MapError::Metadata(format!("fd {fd} is not open")))?;
        if state.broken_metadata.contains(path) {
            return Err(MapError::Metadata(format!(
                "fdinfo for {} unreadable",
                path.display()
            )));
        }
        state
            .pinned
            .get(path)
            .map(|map| map.info)
            .ok_or_else(|| MapError::Metadata(format!("{} was unpinned", path.display())))
    }

    fn possible_cpus(&self) -> Result<u32> {
        Ok(self.state.lock().cpus)
    }

    #[allow(unsafe_code)]
    unsafe fn map_lookup_elem(&self, fd: RawFd, key: &[u8], value: &mut [u8]) -> io::Result<()> {
        let state = self.state.lock();
        if let Some(errno) = state.lookup_errno {
            return Err(io::Error::from_raw_os_error(errno));
        }
        let map = state
            .open
            .get(&fd)
            .and_then(|path| state.pinned.get(path))
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))?;
        let stored = map
            .entries
            .get(key)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        let out = value
            .get_mut(..stored.len())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;
        out.copy_from_slice(stored);
        Ok(())
    }

    fn close(&self, fd: RawFd) {
        let mut state = self.state.lock();
        if state.open.remove(&fd).is_some() {
            state.released.push(fd);
        } else {
            state.double_closes += 1;
        }
    }
}
