//! Lazy freshness evaluation for cache files.
//!
//! Nothing sweeps the cache in the background. Each access stats the file and
//! decides whether it can be served; expired or suspicious files are simply
//! fetched again and overwritten.

use std::path::Path;
use std::time::{Duration, SystemTime};

/// Classification of a cache file at access time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Large enough and young enough to serve.
    Hit { size: u64 },
    /// No regular file at the path.
    Miss,
    /// Present but too small or too old.
    Stale { size: u64, age: Duration },
}

impl Freshness {
    pub fn is_hit(&self) -> bool {
        matches!(self, Freshness::Hit { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Hit { .. } => "hit",
            Freshness::Miss => "miss",
            Freshness::Stale { .. } => "stale",
        }
    }
}

/// Size floor and age ceiling for trusting a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Files of this many bytes or fewer are never trusted (exclusive floor).
    pub min_size: u64,
    /// Files at least this old are stale (exclusive ceiling).
    pub max_age: Duration,
}

impl FreshnessPolicy {
    /// Classify a file of `size` bytes last modified at `modified`, as seen at `now`.
    ///
    /// A modification time in the future counts by its distance from `now`.
    pub fn classify(&self, size: u64, modified: SystemTime, now: SystemTime) -> Freshness {
        let age = now
            .duration_since(modified)
            .unwrap_or_else(|e| e.duration());

        if size > self.min_size && age < self.max_age {
            Freshness::Hit { size }
        } else {
            Freshness::Stale { size, age }
        }
    }

    /// Stat `path` and classify it.
    pub async fn evaluate(&self, path: &Path) -> Freshness {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "stat failed, treating as miss");
                }
                return Freshness::Miss;
            }
        };

        if !metadata.is_file() {
            return Freshness::Miss;
        }

        match metadata.modified() {
            Ok(modified) => self.classify(metadata.len(), modified, SystemTime::now()),
            Err(_) => Freshness::Stale { size: metadata.len(), age: Duration::MAX },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgeUnit, AppConfig};
    use filetime::FileTime;

    const DAY: Duration = Duration::from_secs(86_400);

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy { min_size: 200, max_age: 30 * DAY }
    }

    #[test]
    fn test_classify_hit() {
        let now = SystemTime::now();
        assert_eq!(policy().classify(201, now - DAY, now), Freshness::Hit { size: 201 });
    }

    #[test]
    fn test_classify_size_floor_is_exclusive() {
        let now = SystemTime::now();
        let result = policy().classify(200, now, now);
        assert!(matches!(result, Freshness::Stale { size: 200, .. }));
        assert!(matches!(policy().classify(0, now, now), Freshness::Stale { .. }));
    }

    #[test]
    fn test_classify_age_ceiling_is_exclusive() {
        let now = SystemTime::now();
        let result = policy().classify(1024, now - 30 * DAY, now);
        assert_eq!(result, Freshness::Stale { size: 1024, age: 30 * DAY });

        let just_under = now - 30 * DAY + Duration::from_secs(1);
        assert!(policy().classify(1024, just_under, now).is_hit());
    }

    #[test]
    fn test_classify_future_mtime_uses_absolute_age() {
        let now = SystemTime::now();
        assert!(policy().classify(1024, now + DAY, now).is_hit());
        assert!(!policy().classify(1024, now + 31 * DAY, now).is_hit());
    }

    #[test]
    fn test_age_units_disagree_between_30_and_1800_days() {
        let now = SystemTime::now();
        let literal = AppConfig::default().freshness_policy();
        let days = AppConfig { age_unit: AgeUnit::Day, ..Default::default() }.freshness_policy();

        let hundred_days_old = now - 100 * DAY;
        assert!(literal.classify(1024, hundred_days_old, now).is_hit());
        assert!(!days.classify(1024, hundred_days_old, now).is_hit());

        let ten_days_old = now - 10 * DAY;
        assert!(literal.classify(1024, ten_days_old, now).is_hit());
        assert!(days.classify(1024, ten_days_old, now).is_hit());

        let ancient = now - 1801 * DAY;
        assert!(!literal.classify(1024, ancient, now).is_hit());
    }

    #[tokio::test]
    async fn test_evaluate_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = policy().evaluate(&dir.path().join("nope.png")).await;
        assert_eq!(result, Freshness::Miss);
    }

    #[tokio::test]
    async fn test_evaluate_directory_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(policy().evaluate(dir.path()).await, Freshness::Miss);
    }

    #[tokio::test]
    async fn test_evaluate_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        std::fs::write(&path, vec![7u8; 512]).unwrap();

        assert_eq!(policy().evaluate(&path).await, Freshness::Hit { size: 512 });
    }

    #[tokio::test]
    async fn test_evaluate_small_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        std::fs::write(&path, b"tiny").unwrap();

        assert!(matches!(policy().evaluate(&path).await, Freshness::Stale { size: 4, .. }));
    }

    #[tokio::test]
    async fn test_evaluate_old_file_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        std::fs::write(&path, vec![7u8; 512]).unwrap();
        let old = SystemTime::now() - 31 * DAY;
        filetime::set_file_mtime(&path, FileTime::from_system_time(old)).unwrap();

        let result = policy().evaluate(&path).await;
        assert!(matches!(result, Freshness::Stale { size: 512, age } if age >= 31 * DAY));
        assert_eq!(result.label(), "stale");
    }
}
