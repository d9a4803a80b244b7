//! Software breakpoints: single-byte trap patches over live tracee code.

use nix::sys::ptrace::{self, AddressType};
use nix::unistd::Pid;
use tracing::debug;

use crate::debugger::{Debugger, Registers};
use crate::error::Result;

/// The x86 `INT3` opcode, written over the low byte of the patched word.
pub const TRAP_OPCODE: u8 = 0xcc;

/// Action invoked with the current register snapshot when a breakpoint fires.
pub type BreakpointCallback = Box<dyn FnMut(&mut Registers, &mut Debugger)>;

/// One installable/removable code patch at a fixed address.
///
/// The word read from the tracee before patching is kept so the exact original
/// bytes can be restored on [`uninstall`](Breakpoint::uninstall).
pub struct Breakpoint {
    addr: u64,
    pid: Pid,
    name: String,
    pub(crate) callable: Option<BreakpointCallback>,
    installed: bool,
    original: i64,
}

impl Breakpoint {
    pub fn new(
        addr: u64,
        pid: Pid,
        name: impl Into<String>,
        callable: Option<BreakpointCallback>,
    ) -> Self {
        Self {
            addr,
            pid,
            name: name.into(),
            callable,
            installed: false,
            original: 0,
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// The pid the patch belongs to. Rewritten when the debugger follows a fork.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn set_pid(&mut self, pid: Pid) {
        self.pid = pid;
    }

    /// Patch the tracee: save the word at `addr`, then poke it back with the
    /// low byte replaced by [`TRAP_OPCODE`].
    ///
    /// A failed peek leaves the tracee unmodified and the breakpoint
    /// uninstalled. This is a soft failure: the caller may retry once the
    /// address is mapped. Installing an already-installed breakpoint is a
    /// no-op, so the trap word itself is never re-saved as `original`.
    pub fn install(&mut self) -> Result<()> {
        if self.installed {
            return Ok(());
        }

        match ptrace::read(self.pid, self.addr as AddressType) {
            Ok(word) => {
                self.original = word;
                let patched = trap_word(word);

                unsafe {
                    ptrace::write(
                        self.pid,
                        self.addr as AddressType,
                        patched as AddressType,
                    )?;
                }

                self.installed = true;
            },
            Err(errno) => {
                debug!(
                    pid = self.pid.as_raw(),
                    addr = self.addr,
                    %errno,
                    "peek failed, leaving breakpoint uninstalled"
                );

                self.installed = false;
            },
        }

        Ok(())
    }

    /// Restore the saved original word over `addr`.
    ///
    /// No-op if the breakpoint is not installed. A saved word equal to the
    /// bare trap opcode marks a corrupted record and is never poked back.
    pub fn uninstall(&mut self) -> Result<()> {
        if !self.installed {
            return Ok(());
        }

        if self.original != i64::from(TRAP_OPCODE) {
            unsafe {
                ptrace::write(
                    self.pid,
                    self.addr as AddressType,
                    self.original as AddressType,
                )?;
            }

            self.installed = false;
        }

        Ok(())
    }

    /// The word saved by the last successful [`install`](Breakpoint::install).
    pub fn original(&self) -> i64 {
        self.original
    }

    /// Invoke the stored callback, if any. A breakpoint with no callback
    /// fires silently.
    pub fn call(&mut self, regs: &mut Registers, dbg: &mut Debugger) {
        if let Some(callable) = self.callable.as_mut() {
            callable(regs, dbg);
        }
    }
}

/// Replace the low byte of `original` with the trap opcode.
pub(crate) fn trap_word(original: i64) -> i64 {
    (original & !0xff) | i64::from(TRAP_OPCODE)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn trap_word_patches_low_byte_only() {
        assert_eq!(trap_word(0x1122_3344_5566_7788), 0x1122_3344_5566_77cc);
        assert_eq!(trap_word(0), 0xcc);
        assert_eq!(trap_word(-1), -1i64 & !0xff | 0xcc);
    }

    #[test]
    fn new_breakpoint_starts_uninstalled() {
        let bp = Breakpoint::new(0x1000, Pid::from_raw(1234), "entry", None);

        assert_eq!(bp.addr(), 0x1000);
        assert_eq!(bp.name(), "entry");
        assert!(!bp.is_installed());
    }

    #[test]
    fn call_without_callback_fires_silently() {
        let mut bp = Breakpoint::new(0x1000, Pid::from_raw(1234), "", None);
        let mut dbg = Debugger::new(Pid::from_raw(1234));
        let mut regs: Registers = unsafe { std::mem::zeroed() };

        bp.call(&mut regs, &mut dbg);
    }

    #[test]
    fn call_invokes_stored_callback() {
        let fired = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&fired);

        let callable: BreakpointCallback = Box::new(move |regs, _dbg| {
            seen.set(seen.get() + 1);
            regs.rax = 7;
        });

        let mut bp = Breakpoint::new(0x1000, Pid::from_raw(1234), "", Some(callable));
        let mut dbg = Debugger::new(Pid::from_raw(1234));
        let mut regs: Registers = unsafe { std::mem::zeroed() };

        bp.call(&mut regs, &mut dbg);
        bp.call(&mut regs, &mut dbg);

        assert_eq!(fired.get(), 2);
        assert_eq!(regs.rax, 7);
    }
}
