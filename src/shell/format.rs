//! Display helpers for listings.

use chrono::{DateTime, Utc};

use crate::fs::node::Node;
use crate::fs::FileSystem;

const UNITS: [&str; 4] = ["B", "K", "M", "G"];

/// `512B`, `1.5K`, `2.0M`...
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%b %e %H:%M").to_string()
}

/// One `ls` row: permissions, size, modification time, name.
pub fn ls_line(fs: &FileSystem, node: &Node) -> String {
    format!(
        "{} {:>6} {} {}{}",
        fs.permission_string(node.id),
        format_size(node.metadata.size),
        format_time(&node.metadata.modified_at),
        node.name,
        if node.is_directory() { "/" } else { "" }
    )
}
