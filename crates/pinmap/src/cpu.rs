//! Possible-CPU topology.
//!
//! Per-CPU maps size their lookup buffer by the number of *possible* CPUs,
//! not online ones. The kernel publishes them as a range list in
//! `/sys/devices/system/cpu/possible`, e.g. `0-3,8,10-11`.

use std::fs;
use std::path::Path;

use crate::{MapError, PERCPU_VALUE_ALIGN, Result};

/// Count the CPUs named by a range list.
pub fn parse_possible(text: &str) -> Result<u32> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MapError::CpuTopology("empty CPU list".to_string()));
    }

    let mut count: u32 = 0;
    for part in text.split(',') {
        let part = part.trim();
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_cpu(start)?, parse_cpu(end)?),
            None => {
                let cpu = parse_cpu(part)?;
                (cpu, cpu)
            }
        };
        if end < start {
            return Err(MapError::CpuTopology(format!("descending range {part:?}")));
        }
        count = count
            .checked_add(end - start + 1)
            .ok_or_else(|| MapError::CpuTopology(format!("CPU count overflow at {part:?}")))?;
    }
    Ok(count)
}

fn parse_cpu(s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .map_err(|e| MapError::CpuTopology(format!("invalid CPU number {s:?}: {e}")))
}

/// Read and count the possible-CPU list at `path`.
pub fn read_possible(path: &Path) -> Result<u32> {
    let text = fs::read_to_string(path)
        .map_err(|e| MapError::CpuTopology(format!("{}: {e}", path.display())))?;
    parse_possible(&text)
}

/// Bytes the kernel writes for one per-CPU lookup.
///
/// Each CPU slot is `value_size` rounded up to 8 bytes. Returns `None` on
/// overflow.
pub fn per_cpu_value_size(value_size: u32, cpus: u32) -> Option<u64> {
    u64::from(value_size)
        .checked_next_multiple_of(PERCPU_VALUE_ALIGN)?
        .checked_mul(u64::from(cpus))
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_single_range() {
        assert_eq!(parse_possible("0-3\n").expect("parse"), 4);
        assert_eq!(parse_possible("0").expect("parse"), 1);
    }

    #[test]
    fn test_parse_mixed_list() {
        assert_eq!(parse_possible("0-3,8,10-11").expect("parse"), 7);
        assert_eq!(parse_possible(" 0 , 2-2 ").expect("parse"), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_possible("").is_err());
        assert!(parse_possible("\n").is_err());
        assert!(parse_possible("a-b").is_err());
        assert!(parse_possible("3-1").is_err());
        assert!(parse_possible("0-3,").is_err());
    }

    #[test]
    fn test_read_possible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("possible");
        std::fs::write(&path, "0-15\n").expect("write");
        assert_eq!(read_possible(&path).expect("read"), 16);

        let missing = dir.path().join("missing");
        assert!(matches!(
            read_possible(&missing),
            Err(MapError::CpuTopology(_))
        ));
    }

    #[test]
    fn test_per_cpu_value_size() {
        assert_eq!(per_cpu_value_size(8, 4), Some(32));
        assert_eq!(per_cpu_value_size(4, 4), Some(32));
        assert_eq!(per_cpu_value_size(12, 2), Some(32));
        assert_eq!(per_cpu_value_size(0, 4), Some(0));
        assert_eq!(
            per_cpu_value_size(u32::MAX, u32::MAX),
            Some((u64::from(u32::MAX) + 1) * u64::from(u32::MAX))
        );
    }

    proptest! {
        #[test]
        fn prop_contiguous_range_count(start in 0u32..1024, len in 1u32..1024) {
            let end = start + len - 1;
            let list = format!("{start}-{end}");
            prop_assert_eq!(parse_possible(&list).expect("parse"), len);
        }

        #[test]
        fn prop_per_cpu_slots_are_aligned(value_size in 0u32..10_000, cpus in 1u32..256) {
            let total = per_cpu_value_size(value_size, cpus).expect("no overflow");
            prop_assert_eq!(total % u64::from(cpus), 0);
            let slot = total / u64::from(cpus);
            prop_assert_eq!(slot % 8, 0);
            prop_assert!(slot >= u64::from(value_size));
            prop_assert!(slot < u64::from(value_size) + 8);
        }
    }
}
