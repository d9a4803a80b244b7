//! Region-granularity scanning of tracee memory for a 32-bit value.
//!
//! All scanning is word-aligned: the stride is 4 bytes, so a value sitting at
//! a non-multiple-of-4 offset is never found. Callers rely on the aligned
//! semantics, so this is a documented limitation, not one to fix.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use nix::sys::ptrace::{self, AddressType};
use tracing::trace;

use crate::debugger::Debugger;
use crate::error::Result;

impl Debugger {
    /// Scan `[base, limit)` for `value` at 4-byte stride, returning every
    /// matching address. `on_match` (if given) fires eagerly per match, in
    /// addition to the returned collection.
    ///
    /// The strategy is selected by
    /// [`use_ptrace_for_search`](Debugger::use_ptrace_for_search): one peek
    /// per word, or a single bulk read of `/proc/<pid>/mem` scanned in
    /// memory. The bulk path requires the memory file to be readable, which
    /// usually means being attached.
    pub fn search_page(
        &self,
        base: u64,
        limit: u64,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<u64>> {
        let mut nop = |_addr: u64| {};
        let sink = on_match.unwrap_or(&mut nop);

        self.search_span(base, limit, value, sink)
    }

    /// Scan every maps region whose pathname carries the bracketed `tag`
    /// (e.g. `heap`, `stack`), one result set per matching region.
    pub fn search_by_name(
        &self,
        tag: &str,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<Vec<u64>>> {
        let mut nop = |_addr: u64| {};
        let sink = on_match.unwrap_or(&mut nop);

        let tag = format!("[{}]", tag);
        let mut hits = Vec::new();

        for region in self.maps()? {
            let named = match &region.pathname {
                Some(path) => path.contains(&tag),
                None => false,
            };

            if named {
                hits.push(self.search_span(region.start, region.end, value, &mut *sink)?);
            }
        }

        Ok(hits)
    }

    /// Scan every maps region whose permission field contains `perm`
    /// (e.g. `'w'`, `'x'`), one result set per matching region.
    pub fn search_by_permission(
        &self,
        perm: char,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<Vec<u64>>> {
        let mut nop = |_addr: u64| {};
        let sink = on_match.unwrap_or(&mut nop);

        let mut hits = Vec::new();

        for region in self.maps()? {
            if region.perms.contains(perm) {
                hits.push(self.search_span(region.start, region.end, value, &mut *sink)?);
            }
        }

        Ok(hits)
    }

    /// Scan the `[heap]` mapping.
    pub fn search_heap(
        &self,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<Vec<u64>>> {
        self.search_by_name("heap", value, on_match)
    }

    /// Scan the `[stack]` mapping.
    pub fn search_stack(
        &self,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<Vec<u64>>> {
        self.search_by_name("stack", value, on_match)
    }

    /// Refresh the region cache, then scan every cached region. Degenerate
    /// entries (zero start or zero size) are skipped.
    pub fn search_process(
        &mut self,
        value: u32,
        on_match: Option<&mut dyn FnMut(u64)>,
    ) -> Result<Vec<Vec<u64>>> {
        let mut nop = |_addr: u64| {};
        let sink = on_match.unwrap_or(&mut nop);

        self.refresh_mapped_regions()?;

        let spans: Vec<(u64, u64)> = self
            .mapped_regions
            .iter()
            .map(|(&start, &size)| (start, size))
            .collect();

        let mut hits = Vec::new();

        for (start, size) in spans {
            if start == 0 || size == 0 {
                continue;
            }

            hits.push(self.search_span(start, start + size, value, &mut *sink)?);
        }

        Ok(hits)
    }

    fn search_span(
        &self,
        base: u64,
        limit: u64,
        value: u32,
        sink: &mut dyn FnMut(u64),
    ) -> Result<Vec<u64>> {
        trace!(
            pid = self.pid.as_raw(),
            base,
            limit,
            ptrace = self.use_ptrace_for_search,
            "scanning span"
        );

        if self.use_ptrace_for_search {
            self.search_span_ptrace(base, limit, value, sink)
        } else {
            self.search_span_mem(base, limit, value, sink)
        }
    }

    // One peek syscall per word. Unreadable words are skipped, not fatal, so
    // a span straddling an unmapped tail degrades to its readable prefix.
    fn search_span_ptrace(
        &self,
        base: u64,
        limit: u64,
        value: u32,
        sink: &mut dyn FnMut(u64),
    ) -> Result<Vec<u64>> {
        let mut found = Vec::new();
        let mut addr = base;

        while addr < limit {
            if let Ok(word) = ptrace::read(self.pid, addr as AddressType) {
                if word as u32 == value {
                    found.push(addr);
                    sink(addr);
                }
            }

            addr += 4;
        }

        Ok(found)
    }

    // Bulk-read the whole span from the memory pseudo-file, then scan the
    // buffer in memory.
    fn search_span_mem(
        &self,
        base: u64,
        limit: u64,
        value: u32,
        sink: &mut dyn FnMut(u64),
    ) -> Result<Vec<u64>> {
        let mut mem = File::open(format!("/proc/{}/mem", self.pid))?;
        mem.seek(SeekFrom::Start(base))?;

        let mut buf = vec![0u8; (limit - base) as usize];
        mem.read_exact(&mut buf)?;

        Ok(scan_buffer(&buf, base, value, sink))
    }
}

// Scan a byte buffer for `value` in 4-byte little-endian words at 4-byte
// stride. A tail shorter than one word is ignored.
pub(crate) fn scan_buffer(
    buf: &[u8],
    base: u64,
    value: u32,
    sink: &mut dyn FnMut(u64),
) -> Vec<u64> {
    let mut found = Vec::new();
    let mut off = 0;

    while off + 4 <= buf.len() {
        let word = u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);

        if word == value {
            let addr = base + off as u64;
            found.push(addr);
            sink(addr);
        }

        off += 4;
    }

    found
}
