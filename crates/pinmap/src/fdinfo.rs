//! Map metadata from `/proc/self/fdinfo/<fd>`.
//!
//! For a BPF map descriptor the kernel appends `tag:\tvalue` lines such as:
//!
//! ```text
//! map_type:	1
//! key_size:	4
//! value_size:	8
//! max_entries:	1024
//! map_flags:	0x0
//! ```
//!
//! `map_type`, `key_size` and `value_size` are required. `max_entries` and
//! `map_flags` are informational: a value that does not parse leaves the
//! field at 0. Other lines are ignored.

use crate::{MapError, MapInfo, Result};

/// Parse the map metadata lines of an fdinfo file.
pub fn parse_map_info(text: &str) -> Result<MapInfo> {
    let mut map_type = None;
    let mut key_size = None;
    let mut value_size = None;
    let mut max_entries = 0;
    let mut map_flags = 0;

    for line in text.lines() {
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match tag.trim() {
            "map_type" => &mut map_type,
            "key_size" => &mut key_size,
            "value_size" => &mut value_size,
            "max_entries" => {
                max_entries = parse_number(tag, value).unwrap_or_default();
                continue;
            }
            "map_flags" => {
                map_flags = parse_number(tag, value).unwrap_or_default();
                continue;
            }
            _ => continue,
        };
        *slot = Some(parse_number(tag, value)?);
    }

    let require = |field: Option<u32>, name: &str| {
        field.ok_or_else(|| MapError::Metadata(format!("fdinfo has no {name} line")))
    };

    Ok(MapInfo {
        map_type: require(map_type, "map_type")?,
        key_size: require(key_size, "key_size")?,
        value_size: require(value_size, "value_size")?,
        max_entries,
        map_flags,
    })
}

/// Decimal, or hex with a `0x` prefix (`map_flags` is printed in hex).
fn parse_number(tag: &str, value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| MapError::Metadata(format!("invalid {tag} value {value:?}: {e}")))
}
