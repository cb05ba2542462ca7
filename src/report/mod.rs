//! On-disk outputs (§6): `<out-dir>/output.log` with a fixed banner and the
//! machine-readable `Data Race Found: {True|False}` verdict line integration
//! tests key off of. Inconclusive runs (tier-3 errors, or a path that was
//! Killed/deadlocked without a race ever being found) still get a banner,
//! but deliberately omit the verdict line — there is nothing sound to report
//! per §7's recovery policy.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::driver::Verdict;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir { path: String, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: std::io::Error },
}

fn open(out_dir: &Path) -> Result<(std::fs::File, String), ReportError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|source| ReportError::CreateDir { path: out_dir.display().to_string(), source })?;
    let path = out_dir.join("output.log");
    let file = std::fs::File::create(&path).map_err(|source| ReportError::Write { path: path.display().to_string(), source })?;
    Ok((file, path.display().to_string()))
}

pub fn write_verdict(out_dir: &Path, verdict: &Verdict) -> Result<(), ReportError> {
    let (mut file, path) = open(out_dir)?;
    let wr = |f: &mut std::fs::File, line: &str| f.write_all(line.as_bytes()).and_then(|_| f.write_all(b"\n"));
    wr(&mut file, "racecheck: stateless dynamic partial-order reduction exploration")
        .map_err(|source| ReportError::Write { path: path.clone(), source })?;
    wr(&mut file, &format!("paths explored: {}", verdict.paths_explored)).map_err(|source| ReportError::Write { path: path.clone(), source })?;
    wr(&mut file, &format!("paths exited: {}", verdict.exited_paths)).map_err(|source| ReportError::Write { path: path.clone(), source })?;
    if verdict.assertion_violation {
        wr(&mut file, "Assertion Violation Found: True").map_err(|source| ReportError::Write { path: path.clone(), source })?;
    }
    wr(&mut file, &format!("Data Race Found: {}", if verdict.data_race_found { "True" } else { "False" }))
        .map_err(|source| ReportError::Write { path, source })?;
    Ok(())
}

/// Written for tier-3 (infrastructure) failures: a banner without a
/// `Data Race Found:` line, since no sound verdict was reached.
pub fn write_inconclusive(out_dir: &Path, reason: &str) -> Result<(), ReportError> {
    let (mut file, path) = open(out_dir)?;
    let wr = |f: &mut std::fs::File, line: &str| f.write_all(line.as_bytes()).and_then(|_| f.write_all(b"\n"));
    wr(&mut file, "racecheck: stateless dynamic partial-order reduction exploration")
        .map_err(|source| ReportError::Write { path: path.clone(), source })?;
    wr(&mut file, &format!("Inconclusive: {reason}")).map_err(|source| ReportError::Write { path, source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_banner_reports_the_race_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let verdict = Verdict { data_race_found: true, assertion_violation: false, inconclusive_reason: None, paths_explored: 3, exited_paths: 1 };
        write_verdict(dir.path(), &verdict).expect("write should succeed");
        let contents = std::fs::read_to_string(dir.path().join("output.log")).expect("output.log should exist");
        assert!(contents.contains("Data Race Found: True"));
    }

    #[test]
    fn inconclusive_banner_omits_the_verdict_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_inconclusive(dir.path(), "Deadlock").expect("write should succeed");
        let contents = std::fs::read_to_string(dir.path().join("output.log")).expect("output.log should exist");
        assert!(!contents.contains("Data Race Found"));
        assert!(contents.contains("Inconclusive: Deadlock"));
    }
}
