//! Parsing and queries over `/proc/<pid>/maps` and `/proc/<pid>/task`.

use std::collections::BTreeMap;
use std::fs;
use std::str::FromStr;

use nix::unistd::Pid;
use tracing::debug;

use crate::error::{Error, Result};

/// One line of the kernel maps table.
///
/// `end` is exclusive in the kernel's own accounting, but address-containment
/// queries here treat it as inclusive (see [`mapping_name`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub dev: String,
    pub inode: u64,
    pub pathname: Option<String>,
}

impl Region {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

impl FromStr for Region {
    type Err = Error;

    // Line format: `start-end perms offset dev inode [pathname]`.
    fn from_str(line: &str) -> Result<Self> {
        let malformed = || Error::MapsFormat { line: line.into() };

        let mut fields = line.split_whitespace();

        let range = fields.next().ok_or_else(malformed)?;
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => {
                let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
                let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;
                (start, end)
            },
            None => return Err(malformed()),
        };

        let perms = fields.next().ok_or_else(malformed)?.to_owned();
        let offset_field = fields.next().ok_or_else(malformed)?;
        let offset = u64::from_str_radix(offset_field, 16).map_err(|_| malformed())?;
        let dev = fields.next().ok_or_else(malformed)?.to_owned();
        let inode_field = fields.next().ok_or_else(malformed)?;
        let inode = inode_field.parse().map_err(|_| malformed())?;

        // Remainder is the pathname, absent for anonymous mappings.
        let rest: Vec<&str> = fields.collect();
        let pathname = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };

        Ok(Self { start, end, perms, offset, dev, inode, pathname })
    }
}

/// Read and parse the full maps table for `pid`.
pub fn regions(pid: Pid) -> Result<Vec<Region>> {
    let text = fs::read_to_string(format!("/proc/{}/maps", pid))?;
    parse_maps(&text)
}

pub(crate) fn parse_maps(text: &str) -> Result<Vec<Region>> {
    text.lines().map(str::parse).collect()
}

/// Pathname of the first region containing `addr`, in file (address) order.
///
/// Containment is inclusive of the region end: an address equal to `end`
/// still names the region. An anonymous containing region yields `None`.
pub fn mapping_name(pid: Pid, addr: u64) -> Result<Option<String>> {
    Ok(name_for(&regions(pid)?, addr))
}

pub(crate) fn name_for(regions: &[Region], addr: u64) -> Option<String> {
    for region in regions {
        if region.start <= addr && addr <= region.end {
            return region.pathname.clone();
        }
    }

    None
}

/// Every `(start, end)` range whose pathname equals `name`, or contains it
/// when `exact` is false. All matches are returned, not just the first.
pub fn mapping_by_name(pid: Pid, name: &str, exact: bool) -> Result<Vec<(u64, u64)>> {
    Ok(ranges_for(&regions(pid)?, name, exact))
}

pub(crate) fn ranges_for(regions: &[Region], name: &str, exact: bool) -> Vec<(u64, u64)> {
    regions
        .iter()
        .filter(|region| match &region.pathname {
            Some(path) => {
                if exact {
                    path == name
                } else {
                    path.contains(name)
                }
            },
            None => false,
        })
        .map(|region| (region.start, region.end))
        .collect()
}

/// Range(s) of the `[stack]` pseudo-mapping.
pub fn stack_range(pid: Pid) -> Result<Vec<(u64, u64)>> {
    mapping_by_name(pid, "[stack]", true)
}

/// Range(s) of the `[heap]` pseudo-mapping.
pub fn heap_range(pid: Pid) -> Result<Vec<(u64, u64)>> {
    mapping_by_name(pid, "[heap]", true)
}

/// Map each loaded shared object's region start to its pathname.
///
/// Selects executable, privately-mapped regions backed by a `.so` path. The
/// vdso entry is excluded. Rebuilt from procfs on every call.
pub fn shared_libraries(pid: Pid) -> Result<BTreeMap<u64, String>> {
    if pid.as_raw() == 0 {
        return Err(Error::InvalidPid);
    }

    Ok(shared_libraries_from(&regions(pid)?))
}

pub(crate) fn shared_libraries_from(regions: &[Region]) -> BTreeMap<u64, String> {
    let mut objects = BTreeMap::new();

    for region in regions {
        if !region.perms.contains("xp") {
            continue;
        }

        let path = match &region.pathname {
            Some(path) => path,
            None => continue,
        };

        if path.contains("vdso") || !path.contains(".so") {
            continue;
        }

        objects.insert(region.start, path.clone());
    }

    objects
}

/// Kernel task ids under `/proc/<pid>/task`.
///
/// An unreadable task directory (process already gone) yields an empty list
/// rather than an error.
pub fn threads(pid: Pid) -> Vec<Pid> {
    let entries = match fs::read_dir(format!("/proc/{}/task", pid)) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(pid = pid.as_raw(), %err, "task directory unreadable");

            return Vec::new();
        },
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .map(Pid::from_raw)
        .collect()
}
