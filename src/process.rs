//! Introspection handle for a process, backed entirely by procfs.

use std::fs;
use std::path::PathBuf;

use nix::unistd::Pid;

use crate::error::Result;
use crate::maps::{self, Region};

/// Procfs-backed view of one process. Holds no kernel resources; every query
/// opens, reads, and closes the file it needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Process {
    pid: Pid,
}

impl Process {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The process's argument vector, NUL separators replaced by spaces.
    pub fn cmdline(&self) -> Result<String> {
        let raw = fs::read(format!("/proc/{}/cmdline", self.pid))?;

        let joined = raw
            .split(|&b| b == 0)
            .filter(|arg| !arg.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");

        Ok(joined)
    }

    /// Path of the executable image, via the `exe` symlink.
    pub fn exe(&self) -> Result<PathBuf> {
        Ok(fs::read_link(format!("/proc/{}/exe", self.pid))?)
    }

    pub fn maps(&self) -> Result<Vec<Region>> {
        maps::regions(self.pid)
    }

    pub fn threads(&self) -> Vec<Pid> {
        maps::threads(self.pid)
    }
}

/// Find a process whose command line contains `pattern`, skipping the
/// calling process. Returns the first match in `/proc` enumeration order.
pub fn find_by_pattern(pattern: &str) -> Result<Option<(Pid, String)>> {
    let own_pid = nix::unistd::getpid();

    for entry in fs::read_dir("/proc")? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        let pid = match entry.file_name().to_str().and_then(|name| name.parse().ok()) {
            Some(pid) => Pid::from_raw(pid),
            None => continue,
        };

        if pid == own_pid {
            continue;
        }

        // The process may vanish between readdir and read; skip it.
        let cmdline = match Process::new(pid).cmdline() {
            Ok(cmdline) => cmdline,
            Err(_) => continue,
        };

        if cmdline.contains(pattern) {
            return Ok(Some((pid, cmdline)));
        }
    }

    Ok(None)
}
