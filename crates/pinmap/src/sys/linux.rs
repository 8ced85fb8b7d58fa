//! Linux backend: `bpf(2)` through `libc::syscall`.
//!
//! Map metadata comes from `BPF_OBJ_GET_INFO_BY_FD`, which describes the
//! descriptor itself. When the kernel refuses the query (seccomp filters,
//! kernels without it) the calling process's own fdinfo under
//! `<procfs>/self` is parsed instead. A pid-keyed procfs path is never
//! used: inside another pid namespace it names someone else's descriptor.

use std::ffi::CStr;
use std::fs;
use std::io;
use std::os::unix::io::RawFd;

use libc::{c_long, c_uint, c_void};
use tracing::debug;

use super::attr::{
    AsBytes, BPF_F_RDONLY, BPF_MAP_LOOKUP_ELEM, BPF_OBJ_GET, BPF_OBJ_GET_INFO_BY_FD, BpfMapInfo,
    InfoByFdAttr, MapElemAttr, ObjGetAttr,
};
use super::{BpfSyscalls, MapInfo};
use crate::{HostPaths, MapError, Result, cpu, fdinfo};

/// Kernel backend using the `bpf(2)` system call.
#[derive(Debug, Clone, Default)]
pub struct LinuxBpf {
    paths: HostPaths,
}

impl LinuxBpf {
    /// Backend using the standard procfs and sysfs locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend reading metadata from non-standard locations.
    pub const fn with_paths(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// Host paths in use.
    pub const fn paths(&self) -> &HostPaths {
        &self.paths
    }

    fn obj_get_info(&self, fd: RawFd) -> Result<MapInfo> {
        let mut info = BpfMapInfo::default();
        let mut attr = InfoByFdAttr::map_info(fd, &mut info);
        bpf(BPF_OBJ_GET_INFO_BY_FD, &mut attr).map_err(|source| MapError::Syscall {
            op: "BPF_OBJ_GET_INFO_BY_FD",
            source,
        })?;
        Ok(MapInfo {
            map_type: info.map_type,
            key_size: info.key_size,
            value_size: info.value_size,
            max_entries: info.max_entries,
            map_flags: info.map_flags,
        })
    }
}

/// Issue one bpf(2) command.
///
/// Returns the non-negative syscall result.
#[allow(unsafe_code)]
fn bpf<A: AsBytes>(cmd: u32, attr: &mut A) -> io::Result<c_long> {
    let size = attr.as_bytes().len() as c_uint;
    // SAFETY: `attr` is a repr(C) record matching the kernel layout for
    // `cmd`, and every pointer it carries refers to memory the caller keeps
    // alive for the duration of the call.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_bpf,
            cmd as c_long,
            std::ptr::from_mut(attr).cast::<c_void>(),
            size,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret)
}

impl BpfSyscalls for LinuxBpf {
    fn obj_get(&self, path: &CStr) -> io::Result<RawFd> {
        let mut attr = ObjGetAttr::new(path, BPF_F_RDONLY);
        let fd = bpf(BPF_OBJ_GET, &mut attr)?;
        RawFd::try_from(fd).map_err(|_| io::Error::from_raw_os_error(libc::EBADF))
    }

    fn map_info(&self, fd: RawFd) -> Result<MapInfo> {
        let kernel_err = match self.obj_get_info(fd) {
            Ok(info) => return Ok(info),
            Err(e) => e,
        };

        let path = self.paths.fdinfo_path(fd);
        debug!(
            fd,
            error = %kernel_err,
            path = %path.display(),
            "map info query failed, falling back to fdinfo"
        );
        match fs::read_to_string(&path) {
            Ok(text) => fdinfo::parse_map_info(&text),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "fdinfo unreadable");
                Err(kernel_err)
            }
        }
    }

    fn possible_cpus(&self) -> Result<u32> {
        cpu::read_possible(&self.paths.cpu_possible)
    }

    #[allow(unsafe_code)]
    unsafe fn map_lookup_elem(&self, fd: RawFd, key: &[u8], value: &mut [u8]) -> io::Result<()> {
        let mut attr = MapElemAttr::lookup(fd, key, value);
        bpf(BPF_MAP_LOOKUP_ELEM, &mut attr).map(|_| ())
    }

    #[allow(unsafe_code)]
    fn close(&self, fd: RawFd) {
        // SAFETY: `fd` came from `obj_get` and is closed exactly once by
        // its owner.
        if unsafe { libc::close(fd) } == -1 {
            debug!(fd, error = %io::Error::last_os_error(), "close failed");
        }
    }
}
