//! Map schema and host filesystem locations

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{DEFAULT_CPU_POSSIBLE_PATH, DEFAULT_PROCFS_ROOT, MapType};

/// Shape a pinned map must have for a handle to bind to it.
///
/// `max_value_size` is the buffer size the caller provides on lookup and
/// `min_value_size` the prefix it interprets. A `max_value_size` of 0
/// means "same as `min_value_size`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSchema {
    /// Expected map kind
    pub map_type: MapType,

    /// Key length in bytes
    pub key_size: u32,

    /// Meaningful value prefix in bytes
    pub min_value_size: u32,

    /// Output buffer length the caller guarantees
    #[serde(default)]
    pub max_value_size: u32,
}

impl MapSchema {
    /// Create a schema with a value size range.
    ///
    /// A `max_value_size` of 0 defaults to `min_value_size`. A
    /// `max_value_size` below `min_value_size` is raised to it.
    pub fn new(map_type: MapType, key_size: u32, min_value_size: u32, max_value_size: u32) -> Self {
        Self {
            map_type,
            key_size,
            min_value_size,
            max_value_size,
        }
        .normalized()
    }

    /// Create a schema whose values have exactly `value_size` bytes.
    pub const fn exact(map_type: MapType, key_size: u32, value_size: u32) -> Self {
        Self {
            map_type,
            key_size,
            min_value_size: value_size,
            max_value_size: value_size,
        }
    }

    /// Set the output buffer length
    #[must_use]
    pub fn with_max_value_size(mut self, max_value_size: u32) -> Self {
        self.max_value_size = max_value_size;
        self.normalized()
    }

    /// Apply the `max_value_size` defaulting rule.
    ///
    /// Schemas built through [`MapSchema::new`] are already normalized;
    /// this matters for values assembled field by field or deserialized.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.max_value_size == 0 {
            self.max_value_size = self.min_value_size;
        } else if self.max_value_size < self.min_value_size {
            warn!(
                min_value_size = self.min_value_size,
                max_value_size = self.max_value_size,
                "max_value_size below min_value_size, raising it"
            );
            self.max_value_size = self.min_value_size;
        }
        self
    }

    /// Whether the kernel may write `real` bytes into a buffer of this
    /// schema.
    pub fn admits_value_size(&self, real: u64) -> bool {
        u64::from(self.min_value_size) <= real && real <= u64::from(self.max_value_size)
    }
}

/// Host filesystem locations consulted while binding a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPaths {
    /// procfs mount point (fdinfo metadata)
    pub procfs_root: PathBuf,

    /// Possible-CPU range list (per-CPU value sizing)
    pub cpu_possible: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            procfs_root: PathBuf::from(DEFAULT_PROCFS_ROOT),
            cpu_possible: PathBuf::from(DEFAULT_CPU_POSSIBLE_PATH),
        }
    }
}

impl HostPaths {
    /// Set the procfs mount point
    #[must_use]
    pub fn with_procfs_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.procfs_root = path.as_ref().to_path_buf();
        self
    }

    /// Set the possible-CPU list location
    #[must_use]
    pub fn with_cpu_possible<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cpu_possible = path.as_ref().to_path_buf();
        self
    }

    /// `<procfs>/self/fdinfo/<fd>` for a descriptor of the calling process
    pub fn fdinfo_path(&self, fd: RawFd) -> PathBuf {
        self.procfs_root
            .join("self")
            .join("fdinfo")
            .join(fd.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_max_defaults_to_min() {
        let schema = MapSchema::new(MapType::Hash, 4, 8, 0);
        assert_eq!(schema.max_value_size, 8);
        assert_eq!(schema.min_value_size, 8);
    }

    #[test]
    fn test_exact_schema() {
        let schema = MapSchema::exact(MapType::Array, 4, 16);
        assert_eq!(schema, MapSchema::new(MapType::Array, 4, 16, 0));
    }

    #[test]
    fn test_max_below_min_is_raised() {
        let schema = MapSchema::new(MapType::Hash, 4, 16, 8);
        assert_eq!(schema.max_value_size, 16);

        let schema = MapSchema::exact(MapType::Hash, 4, 16).with_max_value_size(4);
        assert_eq!(schema.max_value_size, 16);
    }

    #[test]
    fn test_admits_value_size() {
        let schema = MapSchema::new(MapType::PercpuArray, 4, 8, 64);
        assert!(!schema.admits_value_size(7));
        assert!(schema.admits_value_size(8));
        assert!(schema.admits_value_size(64));
        assert!(!schema.admits_value_size(65));
    }

    #[test]
    fn test_schema_deserialize_defaults_max() {
        let json = r#"{"map_type":"hash","key_size":4,"min_value_size":12}"#;
        let schema: MapSchema = serde_json::from_str(json).expect("deserialize");
        assert_eq!(schema.max_value_size, 0);
        assert_eq!(schema.normalized().max_value_size, 12);
    }

    #[test]
    fn test_schema_serde_round_trip() {
        let schema = MapSchema::new(MapType::LruPercpuHash, 16, 8, 512);
        let json = serde_json::to_string(&schema).expect("serialize");
        let back: MapSchema = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(schema, back);
    }

    #[test]
    fn test_host_paths_default() {
        let paths = HostPaths::default();
        assert_eq!(paths.procfs_root, Path::new("/proc"));
        assert_eq!(
            paths.cpu_possible,
            Path::new("/sys/devices/system/cpu/possible")
        );
    }

    #[test]
    fn test_fdinfo_path() {
        let paths = HostPaths::default().with_procfs_root("/tmp/proc");
        assert_eq!(
            paths.fdinfo_path(7),
            Path::new("/tmp/proc/self/fdinfo/7")
        );
    }

    proptest! {
        #[test]
        fn prop_normalized_max_never_below_min(min in 0u32..4096, max in 0u32..4096) {
            let schema = MapSchema::new(MapType::Hash, 4, min, max);
            prop_assert!(schema.max_value_size >= schema.min_value_size);
            prop_assert_eq!(schema.min_value_size, min);
            if max >= min && max != 0 {
                prop_assert_eq!(schema.max_value_size, max);
            }
        }
    }
}
