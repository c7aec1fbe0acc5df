//! Verify command implementation.

use decksync_store::RecordStore;
use std::path::Path;

/// Outcome of the collection checks.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Result of `PRAGMA integrity_check`, `None` when it passed.
    pub integrity: Option<String>,
    /// Structural problems found.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// True if every check passed.
    pub fn is_ok(&self) -> bool {
        self.integrity.is_none() && self.problems.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No collection found at {:?}", path).into());
    }
    let store = RecordStore::open_read_only(path)?;
    println!("Verifying collection at {:?}", path);

    let report = verify(&store)?;
    match &report.integrity {
        None => println!("  SQLite integrity: OK"),
        Some(message) => println!("  SQLite integrity: FAILED ({message})"),
    }
    if report.problems.is_empty() {
        println!("  Structure: OK");
    } else {
        println!("  Structure: {} problem(s)", report.problems.len());
        for problem in &report.problems {
            println!("    - {problem}");
        }
    }

    if report.is_ok() {
        println!("Verification passed");
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}

/// Runs every check against `store`.
pub fn verify(store: &RecordStore) -> Result<VerifyReport, Box<dyn std::error::Error>> {
    let mut report = VerifyReport::default();
    if let Err(err) = store.integrity_check() {
        report.integrity = Some(err.to_string());
    }
    report.problems = store.structural_problems()?;
    Ok(report)
}
