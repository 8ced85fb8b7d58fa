//! Kernel BPF map kinds.
//!
//! Values match `enum bpf_map_type` in `<linux/bpf.h>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural kind of a BPF map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
#[allow(missing_docs)]
pub enum MapType {
    Unspec = 0,
    Hash = 1,
    Array = 2,
    ProgArray = 3,
    PerfEventArray = 4,
    PercpuHash = 5,
    PercpuArray = 6,
    StackTrace = 7,
    CgroupArray = 8,
    LruHash = 9,
    LruPercpuHash = 10,
    LpmTrie = 11,
    ArrayOfMaps = 12,
    HashOfMaps = 13,
    Devmap = 14,
    Sockmap = 15,
    Cpumap = 16,
    Xskmap = 17,
    Sockhash = 18,
    CgroupStorage = 19,
    ReuseportSockarray = 20,
    PercpuCgroupStorage = 21,
    Queue = 22,
    Stack = 23,
    SkStorage = 24,
    DevmapHash = 25,
    StructOps = 26,
    Ringbuf = 27,
    InodeStorage = 28,
    TaskStorage = 29,
    BloomFilter = 30,
    UserRingbuf = 31,
    CgrpStorage = 32,
    Arena = 33,
}

impl MapType {
    const ALL: [Self; 34] = [
        Self::Unspec,
        Self::Hash,
        Self::Array,
        Self::ProgArray,
        Self::PerfEventArray,
        Self::PercpuHash,
        Self::PercpuArray,
        Self::StackTrace,
        Self::CgroupArray,
        Self::LruHash,
        Self::LruPercpuHash,
        Self::LpmTrie,
        Self::ArrayOfMaps,
        Self::HashOfMaps,
        Self::Devmap,
        Self::Sockmap,
        Self::Cpumap,
        Self::Xskmap,
        Self::Sockhash,
        Self::CgroupStorage,
        Self::ReuseportSockarray,
        Self::PercpuCgroupStorage,
        Self::Queue,
        Self::Stack,
        Self::SkStorage,
        Self::DevmapHash,
        Self::StructOps,
        Self::Ringbuf,
        Self::InodeStorage,
        Self::TaskStorage,
        Self::BloomFilter,
        Self::UserRingbuf,
        Self::CgrpStorage,
        Self::Arena,
    ];

    /// Kernel numeric value.
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Look up a kind by its kernel numeric value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Whether lookups return one value slot per possible CPU.
    pub const fn is_per_cpu(self) -> bool {
        matches!(
            self,
            Self::PercpuHash | Self::PercpuArray | Self::LruPercpuHash | Self::PercpuCgroupStorage
        )
    }

    /// Whether a map reported as `reported` satisfies a handle declared as
    /// `self`.
    ///
    /// LRU hash maps share the lookup contract of plain hash maps, so an
    /// agent may switch to the LRU variant without breaking readers.
    pub fn accepts(self, reported: u32) -> bool {
        if reported == self.as_raw() {
            return true;
        }
        matches!(
            (self, Self::from_raw(reported)),
            (Self::Hash, Some(Self::LruHash)) | (Self::PercpuHash, Some(Self::LruPercpuHash))
        )
    }

    /// Kernel name without the `BPF_MAP_TYPE_` prefix, lowercased.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unspec => "unspec",
            Self::Hash => "hash",
            Self::Array => "array",
            Self::ProgArray => "prog_array",
            Self::PerfEventArray => "perf_event_array",
            Self::PercpuHash => "percpu_hash",
            Self::PercpuArray => "percpu_array",
            Self::StackTrace => "stack_trace",
            Self::CgroupArray => "cgroup_array",
            Self::LruHash => "lru_hash",
            Self::LruPercpuHash => "lru_percpu_hash",
            Self::LpmTrie => "lpm_trie",
            Self::ArrayOfMaps => "array_of_maps",
            Self::HashOfMaps => "hash_of_maps",
            Self::Devmap => "devmap",
            Self::Sockmap => "sockmap",
            Self::Cpumap => "cpumap",
            Self::Xskmap => "xskmap",
            Self::Sockhash => "sockhash",
            Self::CgroupStorage => "cgroup_storage",
            Self::ReuseportSockarray => "reuseport_sockarray",
            Self::PercpuCgroupStorage => "percpu_cgroup_storage",
            Self::Queue => "queue",
            Self::Stack => "stack",
            Self::SkStorage => "sk_storage",
            Self::DevmapHash => "devmap_hash",
            Self::StructOps => "struct_ops",
            Self::Ringbuf => "ringbuf",
            Self::InodeStorage => "inode_storage",
            Self::TaskStorage => "task_storage",
            Self::BloomFilter => "bloom_filter",
            Self::UserRingbuf => "user_ringbuf",
            Self::CgrpStorage => "cgrp_storage",
            Self::Arena => "arena",
        }
    }
}

impl fmt::Display for MapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_raw())
    }
}

impl TryFrom<u32> for MapType {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or(raw)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values_round_trip() {
        for (i, kind) in MapType::ALL.iter().enumerate() {
            assert_eq!(kind.as_raw() as usize, i);
            assert_eq!(MapType::from_raw(kind.as_raw()), Some(*kind));
        }
        assert_eq!(MapType::from_raw(34), None);
        assert_eq!(MapType::try_from(9), Ok(MapType::LruHash));
        assert_eq!(MapType::try_from(999), Err(999));
    }

    #[test]
    fn test_per_cpu_kinds() {
        assert!(MapType::PercpuHash.is_per_cpu());
        assert!(MapType::PercpuArray.is_per_cpu());
        assert!(MapType::LruPercpuHash.is_per_cpu());
        assert!(MapType::PercpuCgroupStorage.is_per_cpu());
        assert!(!MapType::Hash.is_per_cpu());
        assert!(!MapType::Array.is_per_cpu());
        assert!(!MapType::LruHash.is_per_cpu());
    }

    #[test]
    fn test_accepts_exact_and_lru_variants() {
        assert!(MapType::Hash.accepts(MapType::Hash.as_raw()));
        assert!(MapType::Hash.accepts(MapType::LruHash.as_raw()));
        assert!(MapType::PercpuHash.accepts(MapType::LruPercpuHash.as_raw()));

        // Not symmetric: an LRU reader does not accept a plain hash map
        assert!(!MapType::LruHash.accepts(MapType::Hash.as_raw()));
        assert!(!MapType::Hash.accepts(MapType::Array.as_raw()));
        assert!(!MapType::Hash.accepts(MapType::PercpuHash.as_raw()));
        assert!(!MapType::Hash.accepts(u32::MAX));
    }

    #[test]
    fn test_display() {
        assert_eq!(MapType::Hash.to_string(), "hash (1)");
        assert_eq!(MapType::LruPercpuHash.to_string(), "lru_percpu_hash (10)");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MapType::PercpuArray).expect("serialize");
        assert_eq!(json, "\"percpu_array\"");
        let kind: MapType = serde_json::from_str("\"lru_hash\"").expect("deserialize");
        assert_eq!(kind, MapType::LruHash);
    }
}
