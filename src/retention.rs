use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDateTime};
use clap::ValueEnum;
use log::{debug, info};

use crate::planner::PruneGroup;

/// Directory scheme for organizing completed recordings by time period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Grouping {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Subdirectory a recording with the given timestamp belongs in, or `None`
/// for a flat layout. Weekly grouping anchors on the Monday of the ISO
/// week.
pub fn group_dir(grouping: Grouping, timestamp: NaiveDateTime) -> Option<String> {
    let date = timestamp.date();
    match grouping {
        Grouping::None => None,
        Grouping::Daily => Some(date.format("%Y-%m-%d").to_string()),
        Grouping::Weekly => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            Some(monday.format("%Y-%m-%d").to_string())
        }
        Grouping::Monthly => Some(date.format("%Y-%m").to_string()),
        Grouping::Yearly => Some(date.format("%Y").to_string()),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

/// Remove every file of each outdated recording key, then any grouping
/// directory left empty. Removal is age-based only; the remote listing
/// plays no part. Files already gone are not an error.
pub fn prune(groups: &[PruneGroup], destination: &Path, dry_run: bool) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    let mut candidate_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for group in groups {
        debug!(
            "outdated recording {} has {} file(s)",
            group.key,
            group.files.len()
        );
        for file in &group.files {
            if dry_run {
                info!(
                    "DRY RUN Would remove outdated recording file : {}",
                    file.recording.filename
                );
                continue;
            }

            info!("Removing outdated recording file : {}", file.recording.filename);
            match fs::remove_file(&file.path) {
                Ok(()) => stats.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("cannot remove outdated recording : {}", file.path.display())
                    })
                }
            }

            if let Some(parent) = file.path.parent() {
                if parent != destination {
                    candidate_dirs.insert(parent.to_path_buf());
                }
            }
        }
    }

    for dir in candidate_dirs {
        let empty = match fs::read_dir(&dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot read grouping directory : {}", dir.display()))
            }
        };
        if empty {
            debug!("removing empty grouping directory : {}", dir.display());
            fs::remove_dir(&dir)
                .with_context(|| format!("cannot remove grouping directory : {}", dir.display()))?;
            stats.dirs_removed += 1;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::planner::prune_set;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn group_dir_names() {
        let t = ts(2019, 2, 7); // a Thursday
        assert_eq!(group_dir(Grouping::None, t), None);
        assert_eq!(group_dir(Grouping::Daily, t), Some("2019-02-07".into()));
        assert_eq!(group_dir(Grouping::Weekly, t), Some("2019-02-04".into()));
        assert_eq!(group_dir(Grouping::Monthly, t), Some("2019-02".into()));
        assert_eq!(group_dir(Grouping::Yearly, t), Some("2019".into()));
    }

    #[test]
    fn weekly_grouping_is_stable_across_the_iso_week() {
        // Mon 2019-02-04 through Sun 2019-02-10 all land on the Monday
        for day in 4..=10 {
            assert_eq!(
                group_dir(Grouping::Weekly, ts(2019, 2, day)),
                Some("2019-02-04".into()),
                "day {day}"
            );
        }
        assert_eq!(
            group_dir(Grouping::Weekly, ts(2019, 2, 11)),
            Some("2019-02-11".into())
        );
    }

    #[test]
    fn prune_removes_outdated_keys_and_empty_group_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let old_dir = root.join("2019-01-01");
        fs::create_dir(&old_dir).unwrap();
        fs::write(old_dir.join("20190101_080000_NF.mp4"), b"v").unwrap();
        fs::write(old_dir.join("20190101_080000_NF.thm"), b"t").unwrap();
        fs::write(root.join(".20190101_081000_NF.mp4"), b"p").unwrap();

        let new_dir = root.join("2019-01-05");
        fs::create_dir(&new_dir).unwrap();
        fs::write(new_dir.join("20190105_080000_NF.mp4"), b"v").unwrap();

        let local = catalog::scan(root).unwrap();
        let groups = prune_set(&local, Some(NaiveDate::from_ymd_opt(2019, 1, 3).unwrap()));
        let stats = prune(&groups, root, false).unwrap();

        assert_eq!(stats.files_removed, 3);
        assert_eq!(stats.dirs_removed, 1);
        assert!(!old_dir.exists());
        assert!(new_dir.join("20190105_080000_NF.mp4").exists());
        assert!(!root.join(".20190101_081000_NF.mp4").exists());
    }

    #[test]
    fn group_dir_with_remaining_files_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let group = root.join("2019-01");
        fs::create_dir(&group).unwrap();
        fs::write(group.join("20190101_080000_NF.mp4"), b"v").unwrap();
        fs::write(group.join("20190131_080000_NF.mp4"), b"v").unwrap();

        let local = catalog::scan(root).unwrap();
        let groups = prune_set(&local, Some(NaiveDate::from_ymd_opt(2019, 1, 15).unwrap()));
        let stats = prune(&groups, root, false).unwrap();

        assert_eq!(stats.files_removed, 1);
        assert_eq!(stats.dirs_removed, 0);
        assert!(group.join("20190131_080000_NF.mp4").exists());
    }

    #[test]
    fn dry_run_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("20090101_080000_NF.mp4"), b"v").unwrap();

        let local = catalog::scan(root).unwrap();
        let groups = prune_set(&local, Some(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()));
        assert_eq!(groups.len(), 1);

        let stats = prune(&groups, root, true).unwrap();
        assert_eq!(stats, PruneStats::default());
        assert!(root.join("20090101_080000_NF.mp4").exists());
    }
}
