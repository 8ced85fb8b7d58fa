#![allow(clippy::expect_used, clippy::panic)]

//! Look up one key in a pinned BPF map on the running kernel.
//!
//! Usage:
//!   PINMAP_PATH=/sys/fs/bpf/tc/globals/cilium_ipcache \
//!   PINMAP_TYPE=lpm_trie PINMAP_KEY_SIZE=24 PINMAP_VALUE_SIZE=16 \
//!   PINMAP_KEY=200000000a000001000000000000000000000000000000ff \
//!   RUST_LOG=pinmap=debug \
//!       cargo run --example lookup_pinned -p pinmap --features live-kernel
//!
//! `PINMAP_MAX_VALUE_SIZE` widens the output buffer for per-CPU maps.

use pinmap::{MapSchema, MapType, PinnedMap};
use tracing_subscriber::EnvFilter;

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} environment variable not set"))
}

fn env_u32(name: &str, default: Option<u32>) -> u32 {
    match (std::env::var(name), default) {
        (Ok(v), _) => v
            .parse()
            .unwrap_or_else(|e| panic!("{name}={v:?} is not a number: {e}")),
        (Err(_), Some(d)) => d,
        (Err(_), None) => panic!("{name} environment variable not set"),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = env("PINMAP_PATH");
    let map_type: MapType = serde_json::from_value(serde_json::Value::String(env("PINMAP_TYPE")))
        .expect("PINMAP_TYPE must be a map type name such as hash or percpu_array");
    let key = hex::decode(env("PINMAP_KEY")).expect("PINMAP_KEY must be hex");
    let key_size = env_u32("PINMAP_KEY_SIZE", Some(key.len() as u32));
    let value_size = env_u32("PINMAP_VALUE_SIZE", None);
    let max_value_size = env_u32("PINMAP_MAX_VALUE_SIZE", Some(0));

    let schema = MapSchema::new(map_type, key_size, value_size, max_value_size);
    let mut map = PinnedMap::new(schema);

    if !map.open(&path) {
        println!("Failed to open {path} (set RUST_LOG=pinmap=debug for details)");
        return;
    }

    println!("Opened:          {path}");
    println!("Map type:        {}", map.map_type());
    println!("Key size:        {}", map.key_size());
    println!(
        "Value size:      {} (min {}, max {})",
        map.real_value_size().unwrap_or_default(),
        map.min_value_size(),
        map.max_value_size()
    );

    match map.lookup_value(&key) {
        Some(value) => {
            let shown = &value[..map.min_value_size() as usize];
            println!("Value:           {}", hex::encode(shown));
            if value.len() > shown.len() {
                println!("Trailing bytes:  {}", hex::encode(&value[shown.len()..]));
            }
        }
        None => println!("No entry for key {}", hex::encode(&key)),
    }
}
