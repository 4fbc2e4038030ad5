//! Index statistics.
//!
//! `support stats` loads (or builds) the index and prints what it covers:
//! file and passage counts, vocabulary size, on-disk size, and build age.

use anyhow::Result;

use crate::config::Config;
use crate::index::{IndexHandle, IndexOptions};

/// Run the stats command: load the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let handle = IndexHandle::new(IndexOptions::from_config(config));
    let index = handle.get().await?;
    let stats = index.stats();

    let index_size = std::fs::metadata(&config.index.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Support Harness: Index Stats");
    println!("============================");
    println!();
    println!("  Documents:   {}", config.docs.dir.display());
    println!("  Index:       {}", config.index.path.display());
    println!("  Size:        {}", format_bytes(index_size));
    println!("  Built:       {}", format_ts_relative(index.built_at));
    println!();
    println!("  Files:       {}", stats.files);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Terms:       {}", index.vectorizer.vocabulary_len());
    println!();

    Ok(())
}

/// Human-readable size in binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Age of a build timestamp, e.g. "3 hours ago". Builds older than a month,
/// or stamped in the future, print as a UTC date instead.
fn format_ts_relative(ts: i64) -> String {
    let age = chrono::Utc::now().timestamp() - ts;
    let (count, unit) = match age {
        0..=59 => return "just now".to_string(),
        60..=3599 => (age / 60, "min"),
        3600..=86_399 => (age / 3600, "hour"),
        86_400..=2_591_999 => (age / 86_400, "day"),
        _ => {
            return chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| ts.to_string())
        }
    };
    format!("{} {}{} ago", count, unit, if count == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024), "5.0 TB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 3 * 86_400), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00 UTC");
        assert!(format_ts_relative(now + 7200).ends_with("UTC"));
    }
}
