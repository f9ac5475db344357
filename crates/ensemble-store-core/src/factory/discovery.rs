//! Realization discovery.
//!
//! An ensemble path is a glob such as `/case/realization-*/iter-0`. Every
//! directory it matches is one realization; the realization number is the
//! `<N>` in the last `realization-<N>` path component.

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::error::{
    FactoryError, GlobSnafu, InvalidPatternSnafu, MultipleSourceFilesSnafu, NoRealizationsSnafu,
};

/// Layout version of [`EnsembleScanSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

const REALIZATION_PREFIX: &str = "realization-";

/// Typed result of scanning one ensemble's realization directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleScanSnapshot {
    /// Layout version; snapshots of another version are never reused.
    pub version: u32,
    /// Ensemble name the scan was made for.
    pub ensemble_name: String,
    /// The ensemble path pattern that was expanded.
    pub ensemble_path: PathBuf,
    /// Realization number to realization directory.
    pub realizations: BTreeMap<u32, PathBuf>,
    /// When the scan ran.
    pub discovered_at: DateTime<Utc>,
}

impl EnsembleScanSnapshot {
    /// Whether the snapshot can still be trusted.
    ///
    /// It must have the current version and every realization directory it
    /// lists must still exist.
    pub fn is_valid(&self) -> bool {
        self.version == SNAPSHOT_VERSION
            && !self.realizations.is_empty()
            && self.realizations.values().all(|dir| dir.is_dir())
    }

    /// Realization numbers, ascending.
    pub fn realization_numbers(&self) -> Vec<u32> {
        self.realizations.keys().copied().collect()
    }
}

/// Realization number encoded in `path`, from its last `realization-<N>`
/// component.
pub fn realization_number(path: &Path) -> Option<u32> {
    path.components().rev().find_map(|c| match c {
        Component::Normal(os) => os
            .to_str()
            .and_then(|s| s.strip_prefix(REALIZATION_PREFIX))
            .and_then(|n| n.parse().ok()),
        _ => None,
    })
}

/// Expand `ensemble_path` and collect its realization directories.
///
/// Matches that are not directories or carry no realization number are
/// ignored. Blocking; run it off the async runtime.
pub fn scan_ensemble(name: &str, ensemble_path: &Path) -> Result<EnsembleScanSnapshot, FactoryError> {
    let pattern = ensemble_path.to_string_lossy().into_owned();
    let mut realizations: BTreeMap<u32, PathBuf> = BTreeMap::new();

    for entry in glob::glob(&pattern).context(InvalidPatternSnafu { pattern: pattern.as_str() })? {
        let dir = entry.context(GlobSnafu { pattern: pattern.as_str() })?;
        if !dir.is_dir() {
            continue;
        }
        let Some(real) = realization_number(&dir) else {
            log::debug!("ignoring {}: no realization number", dir.display());
            continue;
        };
        if let Some(existing) = realizations.get(&real) {
            log::warn!(
                "ensemble '{name}': realization {real} matched twice ({} and {}); keeping the first",
                existing.display(),
                dir.display()
            );
            continue;
        }
        realizations.insert(real, dir);
    }

    ensure!(
        !realizations.is_empty(),
        NoRealizationsSnafu {
            ensemble: name,
            path: ensemble_path,
        }
    );
    log::info!(
        "ensemble '{name}': found {} realizations under {}",
        realizations.len(),
        ensemble_path.display()
    );

    Ok(EnsembleScanSnapshot {
        version: SNAPSHOT_VERSION,
        ensemble_name: name.to_string(),
        ensemble_path: ensemble_path.to_path_buf(),
        realizations,
        discovered_at: Utc::now(),
    })
}

/// Locate the per-realization file matching `relative_pattern` in each
/// realization of `snapshot`.
///
/// Realizations without a match are left out (and logged); more than one
/// match in a realization is an error.
pub(crate) fn locate_realization_files(
    snapshot: &EnsembleScanSnapshot,
    relative_pattern: &str,
) -> Result<Vec<(u32, PathBuf)>, FactoryError> {
    let mut found = Vec::with_capacity(snapshot.realizations.len());
    let mut missing = Vec::new();

    for (&real, dir) in &snapshot.realizations {
        let pattern = dir.join(relative_pattern).to_string_lossy().into_owned();
        let matches = glob::glob(&pattern)
            .context(InvalidPatternSnafu { pattern: pattern.as_str() })?
            .collect::<Result<Vec<_>, _>>()
            .context(GlobSnafu { pattern: pattern.as_str() })?;

        match matches.as_slice() {
            [] => missing.push(real),
            [single] => found.push((real, single.clone())),
            many => {
                return MultipleSourceFilesSnafu {
                    ensemble: snapshot.ensemble_name.as_str(),
                    realization: real,
                    pattern: relative_pattern,
                    matches: many.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                }
                .fail();
            }
        }
    }

    if !missing.is_empty() && !found.is_empty() {
        log::warn!(
            "partial data: ensemble '{}' has no '{relative_pattern}' in realizations {missing:?}",
            snapshot.ensemble_name
        );
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn make_realizations(root: &Path, reals: &[u32]) -> std::io::Result<()> {
        for r in reals {
            fs::create_dir_all(root.join(format!("realization-{r}")).join("iter-0"))?;
        }
        Ok(())
    }

    #[test]
    fn realization_number_uses_last_component() {
        assert_eq!(realization_number(Path::new("/a/realization-7/iter-0")), Some(7));
        assert_eq!(
            realization_number(Path::new("/realization-1/b/realization-12/pred")),
            Some(12)
        );
        assert_eq!(realization_number(Path::new("/a/realization-x/iter-0")), None);
        assert_eq!(realization_number(Path::new("/a/b")), None);
    }

    #[test]
    fn scan_collects_realization_dirs() -> TestResult {
        let tmp = TempDir::new()?;
        make_realizations(tmp.path(), &[2, 0, 10])?;
        fs::write(tmp.path().join("realization-5"), b"not a dir")?;

        let pattern = tmp.path().join("realization-*").join("iter-0");
        let snap = scan_ensemble("iter-0", &pattern)?;
        assert_eq!(snap.realization_numbers(), vec![0, 2, 10]);
        assert_eq!(snap.version, SNAPSHOT_VERSION);
        assert!(snap.is_valid());
        Ok(())
    }

    #[test]
    fn empty_scan_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let pattern = tmp.path().join("realization-*").join("iter-0");
        let err = scan_ensemble("iter-0", &pattern).expect_err("no realizations");
        assert!(matches!(err, FactoryError::NoRealizations { .. }));
        assert_eq!(err.category(), crate::error::ErrorCategory::NotFound);
        Ok(())
    }

    #[test]
    fn snapshot_goes_stale_when_a_directory_disappears() -> TestResult {
        let tmp = TempDir::new()?;
        make_realizations(tmp.path(), &[0, 1])?;
        let snap = scan_ensemble("e", &tmp.path().join("realization-*").join("iter-0"))?;
        assert!(snap.is_valid());

        fs::remove_dir_all(tmp.path().join("realization-1"))?;
        assert!(!snap.is_valid());

        let mut old = snap.clone();
        old.version = SNAPSHOT_VERSION + 1;
        assert!(!old.is_valid());
        Ok(())
    }

    #[test]
    fn locate_skips_missing_and_rejects_ambiguous() -> TestResult {
        let tmp = TempDir::new()?;
        make_realizations(tmp.path(), &[0, 1, 2])?;
        let at = |r: u32| tmp.path().join(format!("realization-{r}")).join("iter-0");
        fs::create_dir_all(at(0).join("share"))?;
        fs::write(at(0).join("share").join("vol.csv"), b"A\n1\n")?;
        fs::create_dir_all(at(2).join("share"))?;
        fs::write(at(2).join("share").join("vol.csv"), b"A\n2\n")?;

        let snap = scan_ensemble("e", &tmp.path().join("realization-*").join("iter-0"))?;
        let files = locate_realization_files(&snap, "share/vol.csv")?;
        let reals: Vec<u32> = files.iter().map(|(r, _)| *r).collect();
        assert_eq!(reals, vec![0, 2]);

        fs::write(at(2).join("share").join("vol2.csv"), b"A\n3\n")?;
        let err = locate_realization_files(&snap, "share/vol*.csv").expect_err("two matches");
        assert!(matches!(err, FactoryError::MultipleSourceFiles { realization: 2, .. }));
        Ok(())
    }
}
