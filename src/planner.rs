use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;

use crate::catalog::{LocalCatalog, LocalFile};
use crate::filename::{RecordingKey, RecordingType};
use crate::listing::RemoteFile;

/// Ordering policy for the download plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Priority {
    /// Chronological, oldest first.
    Date,
    /// Reverse chronological, newest first.
    Rdate,
    /// Manual, then event, then normal, then parking recordings.
    Type,
}

/// Retention period, e.g. `3d` or `2w`. A bare number means days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepPeriod {
    count: u32,
    unit: KeepUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeepUnit {
    Days,
    Weeks,
}

impl KeepPeriod {
    /// The date before which recordings are neither downloaded nor kept.
    pub fn cutoff_from(&self, today: NaiveDate) -> NaiveDate {
        match self.unit {
            KeepUnit::Days => today - Duration::days(i64::from(self.count)),
            KeepUnit::Weeks => today - Duration::weeks(i64::from(self.count)),
        }
    }
}

impl FromStr for KeepPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, unit) = if let Some(digits) = s.strip_suffix('w') {
            (digits, KeepUnit::Weeks)
        } else if let Some(digits) = s.strip_suffix('d') {
            (digits, KeepUnit::Days)
        } else {
            (s, KeepUnit::Days)
        };
        let count: u32 = digits
            .parse()
            .map_err(|_| format!("KEEP must be in the format <number>[dw], got '{s}'"))?;
        if count < 1 {
            return Err("KEEP must be at least one".to_string());
        }
        Ok(Self { count, unit })
    }
}

impl fmt::Display for KeepPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            KeepUnit::Days => 'd',
            KeepUnit::Weeks => 'w',
        };
        write!(f, "{}{}", self.count, unit)
    }
}

/// Recordings of one outdated key, to be removed as a unit.
#[derive(Debug)]
pub struct PruneGroup {
    pub key: RecordingKey,
    pub files: Vec<LocalFile>,
}

fn type_class(recording_type: RecordingType) -> u8 {
    match recording_type {
        RecordingType::Manual => 0,
        RecordingType::Event(_) => 1,
        RecordingType::Normal => 2,
        RecordingType::Parking => 3,
    }
}

/// Compute the ordered download plan: remote files within the retention
/// window that have no complete local copy of equal size, sorted by the
/// active priority policy.
///
/// Ties are broken by the full recording key and then the file kind, so the
/// plan is identical across runs regardless of input order.
pub fn plan(
    mut remote: Vec<RemoteFile>,
    local: &LocalCatalog,
    priority: Priority,
    cutoff: Option<NaiveDate>,
) -> Vec<RemoteFile> {
    remote.retain(|file| {
        if let Some(cutoff) = cutoff {
            if file.recording.datetime.date() < cutoff {
                return false;
            }
        }
        local.complete_size(&file.recording.filename) != Some(file.size)
    });

    match priority {
        Priority::Date => {
            remote.sort_by_key(|f| (f.recording.datetime, f.recording.key(), f.recording.kind));
        }
        Priority::Rdate => {
            remote.sort_by_key(|f| {
                (
                    Reverse(f.recording.datetime),
                    f.recording.key(),
                    f.recording.kind,
                )
            });
        }
        Priority::Type => {
            remote.sort_by_key(|f| {
                (
                    type_class(f.recording.recording_type),
                    f.recording.datetime,
                    f.recording.key(),
                    f.recording.kind,
                )
            });
        }
    }

    remote
}

/// Local recordings strictly older than the cutoff, grouped by recording
/// key. Removal is all-or-nothing per key: every file kind goes, partial
/// leftovers included. No cutoff means nothing is ever pruned; absence from
/// the remote listing is never grounds for removal.
pub fn prune_set(local: &LocalCatalog, cutoff: Option<NaiveDate>) -> Vec<PruneGroup> {
    let Some(cutoff) = cutoff else {
        return Vec::new();
    };

    let mut groups: BTreeMap<RecordingKey, Vec<LocalFile>> = BTreeMap::new();
    for file in local.files() {
        if file.recording.datetime.date() < cutoff {
            groups.entry(file.recording.key()).or_default().push(file.clone());
        }
    }

    groups
        .into_iter()
        .map(|(key, mut files)| {
            files.sort_by_key(|f| f.recording.kind);
            PruneGroup { key, files }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filename;

    fn remote(name: &str, size: u64) -> RemoteFile {
        RemoteFile {
            recording: filename::parse(name).unwrap(),
            path: format!("/Record/{name}"),
            size,
        }
    }

    fn names(plan: &[RemoteFile]) -> Vec<&str> {
        plan.iter().map(|f| f.recording.filename.as_str()).collect()
    }

    fn catalog_with(files: &[(&str, u64)], partials: &[(&str, u64)]) -> LocalCatalog {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (name, size) in files {
            std::fs::write(root.join(name), vec![0u8; *size as usize]).unwrap();
        }
        for (name, size) in partials {
            std::fs::write(root.join(filename::temp_name(name)), vec![0u8; *size as usize])
                .unwrap();
        }
        crate::catalog::scan(root).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn keep_period_parses() {
        assert_eq!("3".parse::<KeepPeriod>().unwrap().to_string(), "3d");
        assert_eq!("3d".parse::<KeepPeriod>().unwrap().to_string(), "3d");
        assert_eq!("2w".parse::<KeepPeriod>().unwrap().to_string(), "2w");
        assert!("0".parse::<KeepPeriod>().is_err());
        assert!("".parse::<KeepPeriod>().is_err());
        assert!("3x".parse::<KeepPeriod>().is_err());
        assert!("d".parse::<KeepPeriod>().is_err());
    }

    #[test]
    fn keep_period_cutoff() {
        let today = date(2019, 1, 10);
        assert_eq!(
            "3d".parse::<KeepPeriod>().unwrap().cutoff_from(today),
            date(2019, 1, 7)
        );
        assert_eq!(
            "1w".parse::<KeepPeriod>().unwrap().cutoff_from(today),
            date(2019, 1, 3)
        );
    }

    #[test]
    fn plan_skips_complete_local_files_of_equal_size() {
        let local = catalog_with(&[("20190102_120034_NF.mp4", 100)], &[]);
        let remote_files = vec![
            remote("20190102_120034_NF.mp4", 100),
            remote("20190102_120034_NR.mp4", 100),
        ];
        let plan = plan(remote_files, &local, Priority::Date, None);
        assert_eq!(names(&plan), vec!["20190102_120034_NR.mp4"]);
    }

    #[test]
    fn plan_includes_size_mismatches_and_partials() {
        let local = catalog_with(
            &[("20190102_120034_NF.mp4", 50)],
            &[("20190102_120034_NR.mp4", 10)],
        );
        let remote_files = vec![
            remote("20190102_120034_NF.mp4", 100),
            remote("20190102_120034_NR.mp4", 100),
        ];
        let plan = plan(remote_files, &local, Priority::Date, None);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn plan_is_deterministic_regardless_of_input_order() {
        let local = LocalCatalog::default();
        let a = remote("20190102_120034_NF.mp4", 1);
        let b = remote("20190102_120034_NR.mp4", 1);
        let c = remote("20190101_080000_EF.mp4", 1);
        let d = remote("20190102_120034_NF.thm", 1);

        let forward = plan(
            vec![a.clone(), b.clone(), c.clone(), d.clone()],
            &local,
            Priority::Date,
            None,
        );
        let backward = plan(vec![d, c, b, a], &local, Priority::Date, None);
        assert_eq!(names(&forward), names(&backward));
        assert_eq!(
            names(&forward),
            vec![
                "20190101_080000_EF.mp4",
                "20190102_120034_NF.mp4",
                "20190102_120034_NF.thm",
                "20190102_120034_NR.mp4",
            ]
        );
    }

    #[test]
    fn rdate_priority_downloads_newest_first() {
        let local = LocalCatalog::default();
        let plan = plan(
            vec![
                remote("20190101_080000_NF.mp4", 1),
                remote("20190103_080000_NF.mp4", 1),
                remote("20190102_080000_NF.mp4", 1),
            ],
            &local,
            Priority::Rdate,
            None,
        );
        assert_eq!(
            names(&plan),
            vec![
                "20190103_080000_NF.mp4",
                "20190102_080000_NF.mp4",
                "20190101_080000_NF.mp4",
            ]
        );
    }

    #[test]
    fn type_priority_orders_manual_event_normal_parking() {
        let local = LocalCatalog::default();
        let plan = plan(
            vec![
                remote("20190101_080000_PF.mp4", 1),
                remote("20190104_080000_NF.mp4", 1),
                remote("20190102_080000_EF.mp4", 1),
                remote("20190103_080000_IF.mp4", 1), // parked impact sorts as event
                remote("20190109_080000_MF.mp4", 1),
            ],
            &local,
            Priority::Type,
            None,
        );
        assert_eq!(
            names(&plan),
            vec![
                "20190109_080000_MF.mp4",
                "20190102_080000_EF.mp4",
                "20190103_080000_IF.mp4",
                "20190104_080000_NF.mp4",
                "20190101_080000_PF.mp4",
            ]
        );
    }

    #[test]
    fn plan_applies_retention_cutoff() {
        let local = LocalCatalog::default();
        let plan = plan(
            vec![
                remote("20190101_080000_NF.mp4", 1),
                remote("20190105_080000_NF.mp4", 1),
            ],
            &local,
            Priority::Date,
            Some(date(2019, 1, 3)),
        );
        assert_eq!(names(&plan), vec!["20190105_080000_NF.mp4"]);
    }

    #[test]
    fn prune_set_groups_all_kinds_of_an_outdated_key() {
        let local = catalog_with(
            &[
                ("20190101_080000_NF.mp4", 10),
                ("20190101_080000_NF.thm", 1),
                ("20190105_080000_NF.mp4", 10),
            ],
            &[("20190101_080500_NF.mp4", 4)],
        );
        let groups = prune_set(&local, Some(date(2019, 1, 3)));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].files.len(), 2); // video + thumbnail, one key
        assert_eq!(groups[1].files.len(), 1); // the stale partial
        assert!(groups
            .iter()
            .flat_map(|g| &g.files)
            .all(|f| f.recording.datetime.date() < date(2019, 1, 3)));
    }

    #[test]
    fn no_cutoff_means_no_pruning() {
        let local = catalog_with(&[("20090101_080000_NF.mp4", 10)], &[]);
        assert!(prune_set(&local, None).is_empty());
    }

    #[test]
    fn recordings_on_the_cutoff_date_are_kept() {
        let local = catalog_with(&[("20190103_000000_NF.mp4", 10)], &[]);
        assert!(prune_set(&local, Some(date(2019, 1, 3))).is_empty());
    }
}
