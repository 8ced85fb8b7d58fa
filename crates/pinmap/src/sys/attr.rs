//! `bpf_attr` command records.
//!
//! `union bpf_attr` in `<linux/bpf.h>` holds one anonymous struct per
//! command. The kernel reads `size` bytes of it and requires every byte
//! past the fields a command uses to be zero, so each record here is the
//! command's struct alone with explicit padding, passed with its own size.
//!
//! | Command | Offset | Size | Field |
//! |---------|--------|------|-------|
//! | `BPF_OBJ_GET` (7) | 0x00 | 8 | `pathname` (pointer) |
//! | | 0x08 | 4 | `bpf_fd` (0) |
//! | | 0x0C | 4 | `file_flags` |
//! | | 0x10 | 4 | `path_fd` (0) |
//! | | 0x14 | 4 | padding |
//! | `BPF_MAP_LOOKUP_ELEM` (1) | 0x00 | 4 | `map_fd` |
//! | | 0x04 | 4 | padding |
//! | | 0x08 | 8 | `key` (pointer) |
//! | | 0x10 | 8 | `value` (pointer) |
//! | | 0x18 | 8 | `flags` |
//! | `BPF_OBJ_GET_INFO_BY_FD` (15) | 0x00 | 4 | `bpf_fd` |
//! | | 0x04 | 4 | `info_len` |
//! | | 0x08 | 8 | `info` (pointer) |

use std::ffi::CStr;
use std::os::unix::io::RawFd;

/// `BPF_MAP_LOOKUP_ELEM`
pub const BPF_MAP_LOOKUP_ELEM: u32 = 1;

/// `BPF_OBJ_GET`
pub const BPF_OBJ_GET: u32 = 7;

/// `BPF_OBJ_GET_INFO_BY_FD`
pub const BPF_OBJ_GET_INFO_BY_FD: u32 = 15;

/// `BPF_F_RDONLY`: request a read-only descriptor.
pub const BPF_F_RDONLY: u32 = 1 << 3;

/// Record for `BPF_OBJ_GET`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(8))]
pub struct ObjGetAttr {
    /// Pointer to a NUL-terminated path.
    pub pathname: u64,
    /// Must be zero for `BPF_OBJ_GET`.
    pub bpf_fd: u32,
    /// `BPF_F_RDONLY` / `BPF_F_WRONLY`.
    pub file_flags: u32,
    /// Directory fd for relative paths; unused.
    pub path_fd: i32,
    _pad: u32,
}

impl ObjGetAttr {
    /// Record for opening `path` with `file_flags`.
    ///
    /// The record borrows `path` by address; `path` must outlive the
    /// syscall.
    pub fn new(path: &CStr, file_flags: u32) -> Self {
        Self {
            pathname: path.as_ptr() as usize as u64,
            file_flags,
            ..Self::default()
        }
    }
}

/// Record for `BPF_MAP_LOOKUP_ELEM`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(8))]
pub struct MapElemAttr {
    /// Map descriptor.
    pub map_fd: u32,
    _pad: u32,
    /// Pointer to the key.
    pub key: u64,
    /// Pointer to the output value buffer.
    pub value: u64,
    /// Lookup flags (`BPF_F_LOCK`); zero here.
    pub flags: u64,
}

impl MapElemAttr {
    /// Record for looking up `key` in `fd`, writing into `value`.
    pub fn lookup(fd: RawFd, key: &[u8], value: &mut [u8]) -> Self {
        Self {
            map_fd: fd as u32,
            key: key.as_ptr() as usize as u64,
            value: value.as_mut_ptr() as usize as u64,
            ..Self::default()
        }
    }
}

/// Record for `BPF_OBJ_GET_INFO_BY_FD`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(8))]
pub struct InfoByFdAttr {
    /// Object descriptor.
    pub bpf_fd: u32,
    /// Size of the buffer at `info`.
    pub info_len: u32,
    /// Pointer to the info buffer.
    pub info: u64,
}

impl InfoByFdAttr {
    /// Record asking the kernel to fill `info` for `fd`.
    pub fn map_info(fd: RawFd, info: &mut BpfMapInfo) -> Self {
        Self {
            bpf_fd: fd as u32,
            info_len: size_of::<BpfMapInfo>() as u32,
            info: std::ptr::from_mut(info) as usize as u64,
        }
    }
}

/// Leading fields of `struct bpf_map_info`.
///
/// The kernel copies `min(info_len, sizeof(struct bpf_map_info))` bytes
/// back, so a prefix is enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct BpfMapInfo {
    /// `bpf_map_type`
    pub map_type: u32,
    /// Kernel map id
    pub id: u32,
    /// Key size in bytes
    pub key_size: u32,
    /// Value size in bytes
    pub value_size: u32,
    /// Capacity
    pub max_entries: u32,
    /// Creation flags
    pub map_flags: u32,
    /// NUL-padded map name
    pub name: [u8; 16],
}

/// View a padding-free `repr(C)` record as the bytes the kernel reads.
pub trait AsBytes: Copy {
    /// Raw bytes of the record.
    fn as_bytes(&self) -> &[u8];
}

macro_rules! impl_as_bytes {
    ($($ty:ty),*) => {
        $(
            impl AsBytes for $ty {
                #[allow(unsafe_code)]
                fn as_bytes(&self) -> &[u8] {
                    // SAFETY: the record is repr(C) with explicit padding
                    // fields, so every byte is initialized.
                    unsafe {
                        std::slice::from_raw_parts(
                            std::ptr::from_ref(self).cast::<u8>(),
                            size_of::<Self>(),
                        )
                    }
                }
            }
        )*
    };
}

impl_as_bytes!(ObjGetAttr, MapElemAttr, InfoByFdAttr, BpfMapInfo);

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_obj_get_layout() {
        assert_eq!(size_of::<ObjGetAttr>(), 24);
        assert_eq!(offset_of!(ObjGetAttr, pathname), 0x00);
        assert_eq!(offset_of!(ObjGetAttr, bpf_fd), 0x08);
        assert_eq!(offset_of!(ObjGetAttr, file_flags), 0x0C);
        assert_eq!(offset_of!(ObjGetAttr, path_fd), 0x10);
    }

    #[test]
    fn test_map_elem_layout() {
        assert_eq!(size_of::<MapElemAttr>(), 32);
        assert_eq!(offset_of!(MapElemAttr, map_fd), 0x00);
        assert_eq!(offset_of!(MapElemAttr, key), 0x08);
        assert_eq!(offset_of!(MapElemAttr, value), 0x10);
        assert_eq!(offset_of!(MapElemAttr, flags), 0x18);
    }

    #[test]
    fn test_info_by_fd_layout() {
        assert_eq!(size_of::<InfoByFdAttr>(), 16);
        assert_eq!(offset_of!(InfoByFdAttr, bpf_fd), 0x00);
        assert_eq!(offset_of!(InfoByFdAttr, info_len), 0x04);
        assert_eq!(offset_of!(InfoByFdAttr, info), 0x08);
    }

    #[test]
    fn test_bpf_map_info_layout() {
        assert_eq!(size_of::<BpfMapInfo>(), 40);
        assert_eq!(offset_of!(BpfMapInfo, map_type), 0x00);
        assert_eq!(offset_of!(BpfMapInfo, key_size), 0x08);
        assert_eq!(offset_of!(BpfMapInfo, value_size), 0x0C);
        assert_eq!(offset_of!(BpfMapInfo, max_entries), 0x10);
        assert_eq!(offset_of!(BpfMapInfo, name), 0x18);
    }

    #[test]
    fn test_obj_get_bytes() {
        let path = c"/sys/fs/bpf/test";
        let attr = ObjGetAttr::new(path, BPF_F_RDONLY);
        let bytes = attr.as_bytes();

        let ptr = path.as_ptr() as usize as u64;
        assert_eq!(&bytes[0..8], &ptr.to_ne_bytes());
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &BPF_F_RDONLY.to_ne_bytes());
        assert!(bytes[16..24].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_lookup_bytes() {
        let key = [1u8, 0, 0, 0];
        let mut value = [0u8; 8];
        let attr = MapElemAttr::lookup(5, &key, &mut value);
        let bytes = attr.as_bytes();

        assert_eq!(&bytes[0..4], &5u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..16], &(key.as_ptr() as usize as u64).to_ne_bytes());
        assert_eq!(
            &bytes[16..24],
            &(value.as_ptr() as usize as u64).to_ne_bytes()
        );
        assert_eq!(&bytes[24..32], &[0u8; 8]);
    }

    #[test]
    fn test_info_by_fd_bytes() {
        let mut info = BpfMapInfo::default();
        let attr = InfoByFdAttr::map_info(9, &mut info);
        let bytes = attr.as_bytes();

        assert_eq!(&bytes[0..4], &9u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &40u32.to_ne_bytes());
        assert_eq!(
            &bytes[8..16],
            &(std::ptr::from_ref(&info) as usize as u64).to_ne_bytes()
        );
    }
}
