//! Child process discovery.
//!
//! Discovery is a single-level scan: every PID directory under the proc
//! root is checked for a `PPid:` line matching the given root. Grandchildren
//! are not found unless they are themselves added as roots; callers relying
//! on deep trees must account for this.

use crate::config::Pid;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of child PIDs for a root process.
pub trait TreeDiscoverer: Send + Sync {
    /// Returns the PIDs whose recorded parent is `root`, at a single point
    /// in time. Direct children only.
    ///
    /// A root with no children is `Ok` with an empty vec; `Err` means the
    /// enumeration itself failed and the caller should keep its previous
    /// list rather than treating the tree as empty.
    fn children_of(&self, root: Pid) -> io::Result<Vec<Pid>>;

    /// Returns the direct children of any of `roots`. Implementations that
    /// enumerate all processes anyway should override this to scan once
    /// instead of once per root.
    fn children_of_all(&self, roots: &[Pid]) -> io::Result<Vec<Pid>> {
        let mut children = Vec::new();
        for &root in roots {
            children.extend(self.children_of(root)?);
        }
        Ok(children)
    }
}

/// Discovers children by scanning a procfs tree.
#[derive(Debug, Clone)]
pub struct ProcfsTreeDiscoverer {
    proc_root: PathBuf,
}

impl ProcfsTreeDiscoverer {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl TreeDiscoverer for ProcfsTreeDiscoverer {
    fn children_of(&self, root: Pid) -> io::Result<Vec<Pid>> {
        self.children_of_all(std::slice::from_ref(&root))
    }

    // One pass over the proc root regardless of how many roots are watched;
    // every status file is read at most once per refresh.
    fn children_of_all(&self, roots: &[Pid]) -> io::Result<Vec<Pid>> {
        let mut children = Vec::new();
        for pid in list_pids(&self.proc_root)? {
            // Processes exiting mid-scan simply yield no PPid match.
            match read_ppid(&self.proc_root.join(pid.to_string())) {
                Some(ppid) if roots.contains(&ppid) => children.push(pid),
                _ => {}
            }
        }
        debug!(
            "discovered {} children across {} root(s)",
            children.len(),
            roots.len()
        );
        Ok(children)
    }
}

/// Scans a proc root for numeric directory entries (the running PIDs).
pub fn list_pids(root: &Path) -> io::Result<Vec<Pid>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let p = entry.path();
        let name = match p.file_name().and_then(|s| s.to_str()) {
            Some(v) => v,
            None => continue,
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(pid) = name.parse() {
            out.push(pid);
        }
    }
    Ok(out)
}

/// Reads the parent PID from `/proc/<pid>/status`. `None` when the process
/// vanished mid-scan or the status file has no parseable PPid line.
fn read_ppid(proc_path: &Path) -> Option<Pid> {
    let content = fs::read_to_string(proc_path.join("status")).ok()?;

    for line in content.lines() {
        if let Some(v) = line.strip_prefix("PPid:") {
            return v.trim().parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn fake_proc_entry(root: &Path, pid: Pid, ppid: Pid) {
        let dir = root.join(pid.to_string());
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join("status"),
            format!("Name:\tfake\nUmask:\t0022\nPPid:\t{}\n", ppid),
        )
        .unwrap();
    }

    #[test]
    fn test_list_pids_numeric_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("123")).unwrap();
        fs::create_dir(dir.path().join("456")).unwrap();
        fs::create_dir(dir.path().join("self")).unwrap();
        fs::create_dir(dir.path().join("sys")).unwrap();

        let mut pids = list_pids(dir.path()).unwrap();
        pids.sort_unstable();
        assert_eq!(pids, vec![123, 456]);
    }

    #[test]
    fn test_children_of_matches_ppid() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc_entry(dir.path(), 100, 1);
        fake_proc_entry(dir.path(), 200, 100);
        fake_proc_entry(dir.path(), 201, 100);
        // Grandchild: parent is 200, not found by a single-level scan of 100.
        fake_proc_entry(dir.path(), 300, 200);

        let discoverer = ProcfsTreeDiscoverer::new(dir.path());
        let mut children = discoverer.children_of(100).unwrap();
        children.sort_unstable();
        assert_eq!(children, vec![200, 201]);
    }

    #[test]
    fn test_children_of_all_covers_every_root_in_one_pass() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc_entry(dir.path(), 100, 1);
        fake_proc_entry(dir.path(), 110, 1);
        fake_proc_entry(dir.path(), 200, 100);
        fake_proc_entry(dir.path(), 210, 110);
        fake_proc_entry(dir.path(), 220, 999);

        let discoverer = ProcfsTreeDiscoverer::new(dir.path());
        let mut children = discoverer.children_of_all(&[100, 110]).unwrap();
        children.sort_unstable();
        assert_eq!(children, vec![200, 210]);
    }

    #[test]
    fn test_children_of_no_matches_is_empty_ok() {
        let dir = tempfile::tempdir().unwrap();
        fake_proc_entry(dir.path(), 100, 1);

        let discoverer = ProcfsTreeDiscoverer::new(dir.path());
        assert!(discoverer.children_of(999).unwrap().is_empty());
    }

    #[test]
    fn test_children_of_missing_proc_root_errors() {
        let discoverer = ProcfsTreeDiscoverer::new("/nonexistent-proc-root");
        assert!(discoverer.children_of(1).is_err());
    }

    #[test]
    fn test_status_without_ppid_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("100");
        fs::create_dir(&entry).unwrap();
        fs::write(entry.join("status"), "Name:\tfake\n").unwrap();

        let discoverer = ProcfsTreeDiscoverer::new(dir.path());
        assert!(discoverer.children_of(1).unwrap().is_empty());
    }
}
