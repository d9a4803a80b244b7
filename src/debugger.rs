//! The debugger core: breakpoint table, region cache, and the wait/dispatch
//! state machine over raw `wait(2)` statuses.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command};

use nix::{
    errno::Errno,
    sys::{
        ptrace,
        signal::{self, Signal},
        wait::WaitPidFlag,
    },
};
use tracing::{debug, info};

use crate::breakpoint::{Breakpoint, BreakpointCallback};
use crate::error::{Error, Result};
use crate::hooks::{EventHooks, NopHooks};
use crate::maps::{self, Region};
use crate::process::Process;

pub use nix::sys::ptrace::Options;
pub use nix::unistd::Pid;

/// Register state of a tracee.
pub type Registers = libc::user_regs_struct;

/// A ptrace event class delivered in the high bits of a stop status.
///
/// The kernel only reports these for event kinds enabled via
/// [`Debugger::set_options`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PtraceEvent {
    Fork,
    Vfork,
    Clone,
    Exec,
    Exit,
    Other(i32),
}

impl PtraceEvent {
    fn from_code(code: i32) -> Option<Self> {
        let event = match code {
            0 => return None,
            libc::PTRACE_EVENT_FORK => PtraceEvent::Fork,
            libc::PTRACE_EVENT_VFORK => PtraceEvent::Vfork,
            libc::PTRACE_EVENT_CLONE => PtraceEvent::Clone,
            libc::PTRACE_EVENT_EXEC => PtraceEvent::Exec,
            libc::PTRACE_EVENT_EXIT => PtraceEvent::Exit,
            other => PtraceEvent::Other(other),
        };

        Some(event)
    }
}

/// A raw `wait(2)` status, decoded into its three classifying fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitEvent {
    /// Termination-signal field was zero: the child exited normally.
    Exited { code: i32 },

    /// The child was killed by `signo` rather than stopped.
    Signaled { signo: i32, core_dumped: bool },

    /// The child is stopped with a delivered signal, possibly carrying a
    /// ptrace event code.
    Stopped {
        signo: i32,
        event: Option<PtraceEvent>,
    },
}

/// Decode a raw status word.
///
/// The bit layout is:
///
///   31      16 15    8 7 6       0
///    +--------+-------+-+--------+
///    | event  | code  |c| termsig|
///    +--------+-------+-+--------+
///
/// `termsig == 0` is a normal exit with exit code `code`; `termsig == 0x7f`
/// is a stop with delivered signal `code`; anything else is a kill by signal
/// `termsig`, with bit 7 flagging a core dump.
pub fn decode_status(status: i32) -> WaitEvent {
    let termsig = status & 0x7f;

    if termsig == 0 {
        WaitEvent::Exited {
            code: (status >> 8) & 0xff,
        }
    } else if termsig != 0x7f {
        WaitEvent::Signaled {
            signo: termsig,
            core_dumped: status & 0x80 != 0,
        }
    } else {
        WaitEvent::Stopped {
            signo: (status >> 8) & 0xff,
            event: PtraceEvent::from_code(status >> 16),
        }
    }
}

pub(crate) fn waitpid_raw(pid: Pid, flags: WaitPidFlag) -> Result<i32> {
    let mut status: libc::c_int = 0;

    let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, flags.bits()) };
    Errno::result(res)?;

    Ok(status)
}

/// Constructor-time behavior switches, the debugger's only configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DebuggerOptions {
    /// Install all pending breakpoints as part of a successful `attach()`.
    pub install_on_attach: bool,

    /// On a fork ptrace event, re-key the breakpoint table to the new child
    /// and track it instead of the parent.
    pub follow_fork: bool,
}

impl Default for DebuggerOptions {
    fn default() -> Self {
        Self {
            install_on_attach: true,
            follow_fork: false,
        }
    }
}

/// Debugger for one Linux process.
///
/// Configure breakpoints, attach, then drive the control loop by calling
/// [`wait`](Debugger::wait) (or [`run`](Debugger::run)). Each wait blocks for
/// one child-state transition, classifies it, and invokes the matching
/// [`EventHooks`] method; some transitions auto-resume the child, others
/// leave it stopped for caller action.
pub struct Debugger {
    pub(crate) pid: Pid,
    options: DebuggerOptions,
    attached: bool,
    installed: bool,
    exited: bool,
    signal: Option<Signal>,
    pub(crate) breakpoints: BTreeMap<u64, Breakpoint>,
    pub(crate) mapped_regions: BTreeMap<u64, u64>,
    pub(crate) use_ptrace_for_search: bool,
    process: Process,
    hooks: Option<Box<dyn EventHooks>>,
}

impl Debugger {
    pub fn new(pid: Pid) -> Self {
        Self::with_options(pid, DebuggerOptions::default())
    }

    pub fn with_options(pid: Pid, options: DebuggerOptions) -> Self {
        Self {
            pid,
            options,
            attached: false,
            installed: false,
            exited: false,
            signal: None,
            breakpoints: BTreeMap::new(),
            mapped_regions: BTreeMap::new(),
            use_ptrace_for_search: false,
            process: Process::new(pid),
            hooks: Some(Box::new(NopHooks)),
        }
    }

    /// Spawn `cmd` as a tracee.
    ///
    /// The command requests `PTRACE_TRACEME` after `fork()` and pre-`exec()`,
    /// so the first wait observes the exec trap without a race.
    pub fn spawn(cmd: Command) -> Result<(Self, Child)> {
        Self::spawn_with_options(cmd, DebuggerOptions::default())
    }

    pub fn spawn_with_options(
        mut cmd: Command,
        options: DebuggerOptions,
    ) -> Result<(Self, Child)> {
        // On fork, request `PTRACE_TRACEME`.
        unsafe {
            cmd.pre_exec(|| {
                ptrace::traceme().map_err(|err| io::Error::from_raw_os_error(err as i32))
            })
        };

        let child = cmd.spawn()?;
        let pid = Pid::from_raw(child.id() as i32);

        let mut dbg = Self::with_options(pid, options);
        dbg.attached = true;

        Ok((dbg, child))
    }

    /// Replace the hook set invoked by the dispatch machine.
    pub fn set_hooks(&mut self, hooks: Box<dyn EventHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// The signal observed by the most recent `wait`, if any.
    pub fn last_signal(&self) -> Option<Signal> {
        self.signal
    }

    pub fn breakpoints(&self) -> &BTreeMap<u64, Breakpoint> {
        &self.breakpoints
    }

    /// The start→size region cache built by the most recent
    /// [`refresh_mapped_regions`](Debugger::refresh_mapped_regions). May be
    /// stale if the tracee's mappings changed since.
    pub fn mapped_regions(&self) -> &BTreeMap<u64, u64> {
        &self.mapped_regions
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn use_ptrace_for_search(&self) -> bool {
        self.use_ptrace_for_search
    }

    /// Select the scanning strategy: per-word peeks instead of bulk reads of
    /// `/proc/<pid>/mem`.
    pub fn set_use_ptrace_for_search(&mut self, use_ptrace: bool) {
        self.use_ptrace_for_search = use_ptrace;
    }

    // Run `f` against the current hook set. The set is detached for the
    // duration of the call so hooks can receive the debugger itself.
    fn hook(&mut self, f: impl FnOnce(&mut dyn EventHooks, &mut Self)) {
        if let Some(mut hooks) = self.hooks.take() {
            f(hooks.as_mut(), self);

            if self.hooks.is_none() {
                self.hooks = Some(hooks);
            }
        }
    }

    /// Attach to the target process. Failure here is fatal: the debugger
    /// cannot proceed without the attach.
    ///
    /// On success, fires `on_attach` and, when configured, installs all
    /// pending breakpoints.
    pub fn attach(&mut self) -> Result<()> {
        ptrace::attach(self.pid).map_err(|source| Error::Attach {
            pid: self.pid,
            source,
        })?;

        self.attached = true;
        info!(pid = self.pid.as_raw(), "attached to tracee");

        self.hook(|hooks, dbg| hooks.on_attach(dbg));

        if self.options.install_on_attach && !self.installed {
            self.install_bps()?;
        }

        Ok(())
    }

    /// Fire `on_detach`, then detach. Attempted even if breakpoints remain
    /// installed; removing trap bytes beforehand is the caller's job.
    pub fn detach(&mut self) -> Result<()> {
        self.hook(|hooks, dbg| hooks.on_detach(dbg));

        ptrace::detach(self.pid, None)?;
        self.attached = false;

        info!(pid = self.pid.as_raw(), "detached from tracee");

        Ok(())
    }

    /// Fire `on_continue`, then resume the tracee.
    pub fn cont(&mut self) -> Result<()> {
        self.hook(|hooks, dbg| hooks.on_continue(dbg));
        self.resume()
    }

    // Resume without hook invocation.
    fn resume(&mut self) -> Result<()> {
        Ok(ptrace::cont(self.pid, None)?)
    }

    /// Fire `on_single_step`, then execute one instruction.
    pub fn single_step(&mut self) -> Result<()> {
        self.hook(|hooks, dbg| hooks.on_single_step(dbg));

        Ok(ptrace::step(self.pid, None)?)
    }

    /// Set extended tracing options (event reporting) on the tracee.
    pub fn set_options(&self, options: Options) -> Result<()> {
        Ok(ptrace::setoptions(self.pid, options)?)
    }

    pub fn registers(&self) -> Result<Registers> {
        Ok(ptrace::getregs(self.pid)?)
    }

    /// Write back a full register snapshot. Partial updates are not a thing:
    /// mutate a snapshot from [`registers`](Debugger::registers) instead.
    pub fn set_registers(&self, regs: Registers) -> Result<()> {
        Ok(ptrace::setregs(self.pid, regs)?)
    }

    /// Register a breakpoint to be installed at `addr`. At most one
    /// breakpoint per address: the first registration wins.
    pub fn breakpoint_set(
        &mut self,
        addr: u64,
        name: impl Into<String>,
        callable: Option<BreakpointCallback>,
    ) {
        if self.breakpoints.contains_key(&addr) {
            return;
        }

        let bp = Breakpoint::new(addr, self.pid, name, callable);
        self.breakpoints.insert(addr, bp);
    }

    /// Uninstall the breakpoint at `addr`, if any. The table entry survives;
    /// the hit protocol reaps cleared breakpoints after their final stop.
    pub fn breakpoint_clear(&mut self, addr: u64) -> Result<bool> {
        match self.breakpoints.get_mut(&addr) {
            Some(bp) => {
                bp.uninstall()?;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    /// Install every registered breakpoint.
    pub fn install_bps(&mut self) -> Result<()> {
        for bp in self.breakpoints.values_mut() {
            bp.install()?;
        }

        self.installed = true;

        Ok(())
    }

    /// Uninstall every registered breakpoint.
    pub fn uninstall_bps(&mut self) -> Result<()> {
        for bp in self.breakpoints.values_mut() {
            bp.uninstall()?;
        }

        self.installed = false;

        Ok(())
    }

    /// Rebuild the start→size region cache from `/proc/<pid>/maps`.
    pub fn refresh_mapped_regions(&mut self) -> Result<&BTreeMap<u64, u64>> {
        self.mapped_regions.clear();

        for region in self.maps()? {
            self.mapped_regions.insert(region.start, region.size());
        }

        Ok(&self.mapped_regions)
    }

    /// Parse the tracee's full maps table.
    pub fn maps(&self) -> Result<Vec<Region>> {
        maps::regions(self.pid)
    }

    /// See [`maps::mapping_name`].
    pub fn mapping_name(&self, addr: u64) -> Result<Option<String>> {
        maps::mapping_name(self.pid, addr)
    }

    /// See [`maps::mapping_by_name`].
    pub fn mapping_by_name(&self, name: &str, exact: bool) -> Result<Vec<(u64, u64)>> {
        maps::mapping_by_name(self.pid, name, exact)
    }

    pub fn stack_range(&self) -> Result<Vec<(u64, u64)>> {
        maps::stack_range(self.pid)
    }

    pub fn heap_range(&self) -> Result<Vec<(u64, u64)>> {
        maps::heap_range(self.pid)
    }

    /// See [`maps::shared_libraries`].
    pub fn shared_libraries(&self) -> Result<BTreeMap<u64, String>> {
        maps::shared_libraries(self.pid)
    }

    /// See [`maps::threads`].
    pub fn threads(&self) -> Vec<Pid> {
        maps::threads(self.pid)
    }

    /// Block for one child-state transition and dispatch it.
    pub fn wait(&mut self) -> Result<()> {
        self.wait_with(WaitPidFlag::empty())
    }

    /// [`wait`](Debugger::wait) with explicit `waitpid` flags.
    pub fn wait_with(&mut self, flags: WaitPidFlag) -> Result<()> {
        let status = waitpid_raw(self.pid, flags)?;

        self.dispatch(status)
    }

    /// Drive `wait` a fixed number of times, or until the tracee exits.
    pub fn run(&mut self, times: Option<usize>) -> Result<()> {
        match times {
            Some(times) => {
                for _ in 0..times {
                    self.wait()?;
                }
            },
            None => {
                while !self.exited {
                    self.wait()?;
                }
            },
        }

        Ok(())
    }

    // Classify one raw wait status and invoke the matching hook. Unrecognized
    // stop signals are fatal, never silently absorbed: extend the table via
    // `EventHooks` before tracing processes that receive them.
    fn dispatch(&mut self, status: i32) -> Result<()> {
        use Signal::*;

        match decode_status(status) {
            WaitEvent::Exited { code } => {
                debug!(pid = self.pid.as_raw(), code, "tracee exited");

                self.exited = true;
                self.hook(|hooks, dbg| hooks.on_exit(dbg));
            },
            WaitEvent::Signaled { signo, core_dumped } => {
                let signal =
                    Signal::try_from(signo).map_err(|_| Error::UnhandledSignal { signo })?;

                debug!(
                    pid = self.pid.as_raw(),
                    %signal,
                    core_dumped,
                    "tracee killed by signal"
                );

                self.exited = false;
                self.signal = Some(signal);
                self.hook(|hooks, dbg| hooks.on_signal(dbg, signal));
            },
            WaitEvent::Stopped { signo, event } => {
                let signal =
                    Signal::try_from(signo).map_err(|_| Error::UnhandledSignal { signo })?;

                self.signal = Some(signal);

                match signal {
                    SIGINT => {
                        self.hook(|hooks, dbg| hooks.on_sigint(dbg));
                        self.cont()?;
                    },
                    // Left stopped for caller inspection.
                    SIGSEGV => self.hook(|hooks, dbg| hooks.on_segv(dbg)),
                    SIGILL => self.hook(|hooks, dbg| hooks.on_illegal_instruction(dbg)),
                    // SIGIOT is an alias of SIGABRT on Linux.
                    SIGABRT => {
                        self.hook(|hooks, dbg| hooks.on_iot_trap(dbg));
                        self.cont()?;
                    },
                    SIGTRAP => self.handle_trap(event)?,
                    SIGCHLD => self.hook(|hooks, dbg| hooks.on_sigchild(dbg)),
                    SIGTERM => self.hook(|hooks, dbg| hooks.on_sigterm(dbg)),
                    // `cont` fires the `on_continue` hook itself.
                    SIGCONT => self.cont()?,
                    SIGSTOP => {
                        self.hook(|hooks, dbg| hooks.on_sigstop(dbg));
                        signal::kill(self.pid, SIGCONT)?;
                        self.cont()?;
                    },
                    // Resumed without any hook invocation.
                    SIGWINCH => self.resume()?,
                    other => {
                        return Err(Error::UnhandledSignal {
                            signo: other as i32,
                        })
                    },
                }
            },
        }

        Ok(())
    }

    // A SIGTRAP stop is either one of our breakpoints firing or a ptrace
    // event; breakpoints leave the instruction pointer one past the patched
    // byte.
    fn handle_trap(&mut self, event: Option<PtraceEvent>) -> Result<()> {
        self.hook(|hooks, dbg| hooks.on_sigtrap(dbg));

        let regs = self.registers()?;
        let candidate = regs.rip.wrapping_sub(1);

        if self.breakpoints.contains_key(&candidate) {
            self.handle_breakpoint()?;
            self.cont()?;

            return Ok(());
        }

        match event {
            Some(PtraceEvent::Fork) => self.handle_fork_event()?,
            Some(PtraceEvent::Exec) | Some(PtraceEvent::Clone) | Some(PtraceEvent::Vfork) => {
                // Recognized as distinct event classes; no action taken yet.
                debug!(?event, "ptrace event observed, no handler");
            },
            Some(PtraceEvent::Exit) => {
                // Recognized but unhandled; a future extension point.
                debug!("ptrace exit event observed, no handler");
            },
            Some(PtraceEvent::Other(code)) => {
                debug!(code, "unlisted ptrace event code");
                self.cont()?;
            },
            None => self.cont()?,
        }

        Ok(())
    }

    // Fetch the forked child's pid from the event message and, when fork
    // following is enabled, hand control of the breakpoint set to it.
    fn handle_fork_event(&mut self) -> Result<()> {
        let message = ptrace::getevent(self.pid)?;
        let raw = message as i32;

        if self.options.follow_fork && (1..=65535).contains(&raw) {
            self.follow_fork(Pid::from_raw(raw));
        }

        Ok(())
    }

    pub(crate) fn follow_fork(&mut self, child: Pid) {
        debug!(
            old = self.pid.as_raw(),
            new = child.as_raw(),
            "following forked child"
        );

        for bp in self.breakpoints.values_mut() {
            bp.set_pid(child);
        }

        self.pid = child;

        self.hook(|hooks, dbg| hooks.on_fork_child(dbg, child));
    }

    // The stop was at a known breakpoint address. Fire its callback, then
    // step the tracee over the original instruction: restore the word,
    // rewind the instruction pointer, single-step, and re-patch (or reap the
    // entry, if the callback cleared the breakpoint).
    fn handle_breakpoint(&mut self) -> Result<()> {
        let mut regs = self.registers()?;
        let addr = regs.rip.wrapping_sub(1);

        // Detach the callback so it can receive the debugger itself.
        let mut callable = self
            .breakpoints
            .get_mut(&addr)
            .ok_or_else(|| Error::Internal("stop at unregistered breakpoint".into()))?
            .callable
            .take();

        if let Some(callable) = callable.as_mut() {
            callable(&mut regs, self);
        }

        let deferred_delete = match self.breakpoints.get_mut(&addr) {
            Some(bp) => {
                if bp.callable.is_none() {
                    bp.callable = callable;
                }

                // The callback may have requested removal via
                // `breakpoint_clear`; reap the entry once stepped over.
                !bp.is_installed()
            },
            None => true,
        };

        if let Some(bp) = self.breakpoints.get_mut(&addr) {
            bp.uninstall()?;
        }

        regs.rip = addr;
        self.set_registers(regs)?;
        self.single_step()?;

        // The step raises a trap of its own. Drain it here, or the next
        // top-level wait would misroute it; the re-patch below also requires
        // the stop to have landed.
        waitpid_raw(self.pid, WaitPidFlag::empty())?;

        if deferred_delete {
            self.breakpoints.remove(&addr);
        } else if let Some(bp) = self.breakpoints.get_mut(&addr) {
            bp.install()?;
        }

        Ok(())
    }
}

/// Render a register snapshot, one `name value` pair per line.
pub fn format_registers(regs: &Registers) -> String {
    format!(
        "rip {:016x}\n\
         rsp {:016x}\n\
         rbp {:016x}\n\
         rax {:016x}\n\
         rbx {:016x}\n\
         rcx {:016x}\n\
         rdx {:016x}\n\
         rsi {:016x}\n\
         rdi {:016x}\n",
        regs.rip,
        regs.rsp,
        regs.rbp,
        regs.rax,
        regs.rbx,
        regs.rcx,
        regs.rdx,
        regs.rsi,
        regs.rdi,
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;

    // Large enough to never name a live process.
    const NO_SUCH_PID: i32 = 0x7fff_fffe;

    fn stopped(signal: Signal) -> i32 {
        0x7f | ((signal as i32) << 8)
    }

    fn stopped_event(signal: Signal, code: i32) -> i32 {
        stopped(signal) | (code << 16)
    }

    fn exit_status(code: i32) -> i32 {
        code << 8
    }

    struct Recorder {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn install(dbg: &mut Debugger) -> Rc<RefCell<Vec<String>>> {
            let seen = Rc::new(RefCell::new(Vec::new()));
            dbg.set_hooks(Box::new(Recorder {
                seen: Rc::clone(&seen),
            }));
            seen
        }

        fn push(&self, event: &str) {
            self.seen.borrow_mut().push(event.to_owned());
        }
    }

    impl EventHooks for Recorder {
        fn on_attach(&mut self, _dbg: &mut Debugger) {
            self.push("attach");
        }

        fn on_detach(&mut self, _dbg: &mut Debugger) {
            self.push("detach");
        }

        fn on_continue(&mut self, _dbg: &mut Debugger) {
            self.push("continue");
        }

        fn on_single_step(&mut self, _dbg: &mut Debugger) {
            self.push("single_step");
        }

        fn on_exit(&mut self, _dbg: &mut Debugger) {
            self.push("exit");
        }

        fn on_signal(&mut self, _dbg: &mut Debugger, signal: Signal) {
            self.push(&format!("signal {}", signal));
        }

        fn on_sigint(&mut self, _dbg: &mut Debugger) {
            self.push("sigint");
        }

        fn on_segv(&mut self, _dbg: &mut Debugger) {
            self.push("segv");
        }

        fn on_illegal_instruction(&mut self, _dbg: &mut Debugger) {
            self.push("illegal_instruction");
        }

        fn on_sigtrap(&mut self, _dbg: &mut Debugger) {
            self.push("sigtrap");
        }

        fn on_fork_child(&mut self, _dbg: &mut Debugger, child: Pid) {
            self.push(&format!("fork_child {}", child));
        }

        fn on_sigchild(&mut self, _dbg: &mut Debugger) {
            self.push("sigchild");
        }

        fn on_sigterm(&mut self, _dbg: &mut Debugger) {
            self.push("sigterm");
        }

        fn on_sigstop(&mut self, _dbg: &mut Debugger) {
            self.push("sigstop");
        }

        fn on_iot_trap(&mut self, _dbg: &mut Debugger) {
            self.push("iot_trap");
        }
    }

    #[test]
    fn decode_normal_exit() {
        assert_eq!(decode_status(exit_status(0)), WaitEvent::Exited { code: 0 });
        assert_eq!(
            decode_status(exit_status(3)),
            WaitEvent::Exited { code: 3 },
        );
    }

    #[test]
    fn decode_killed_by_signal() {
        assert_eq!(
            decode_status(libc::SIGKILL),
            WaitEvent::Signaled {
                signo: libc::SIGKILL,
                core_dumped: false,
            },
        );
        assert_eq!(
            decode_status(libc::SIGSEGV | 0x80),
            WaitEvent::Signaled {
                signo: libc::SIGSEGV,
                core_dumped: true,
            },
        );
    }

    #[test]
    fn decode_stop_without_event() {
        assert_eq!(
            decode_status(stopped(Signal::SIGTRAP)),
            WaitEvent::Stopped {
                signo: libc::SIGTRAP,
                event: None,
            },
        );
    }

    #[test]
    fn decode_stop_with_event_codes() {
        let cases = [
            (libc::PTRACE_EVENT_FORK, PtraceEvent::Fork),
            (libc::PTRACE_EVENT_VFORK, PtraceEvent::Vfork),
            (libc::PTRACE_EVENT_CLONE, PtraceEvent::Clone),
            (libc::PTRACE_EVENT_EXEC, PtraceEvent::Exec),
            (libc::PTRACE_EVENT_EXIT, PtraceEvent::Exit),
            (42, PtraceEvent::Other(42)),
        ];

        for (code, event) in cases {
            assert_eq!(
                decode_status(stopped_event(Signal::SIGTRAP, code)),
                WaitEvent::Stopped {
                    signo: libc::SIGTRAP,
                    event: Some(event),
                },
            );
        }
    }

    #[test]
    fn exit_status_is_terminal() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        dbg.dispatch(exit_status(0)).unwrap();

        assert!(dbg.is_exited());
        assert_eq!(*seen.borrow(), vec!["exit"]);
    }

    #[test]
    fn kill_by_signal_fires_on_signal() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        dbg.dispatch(libc::SIGKILL).unwrap();

        assert!(!dbg.is_exited());
        assert_eq!(dbg.last_signal(), Some(Signal::SIGKILL));
        assert_eq!(*seen.borrow(), vec!["signal SIGKILL"]);
    }

    #[test]
    fn stops_without_auto_continue_fire_hook_only() {
        let cases = [
            (Signal::SIGSEGV, "segv"),
            (Signal::SIGILL, "illegal_instruction"),
            (Signal::SIGCHLD, "sigchild"),
            (Signal::SIGTERM, "sigterm"),
        ];

        for (signal, hook) in cases {
            let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
            let seen = Recorder::install(&mut dbg);

            // No ptrace request is issued, so a fake pid succeeds.
            dbg.dispatch(stopped(signal)).unwrap();

            assert_eq!(*seen.borrow(), vec![hook]);
            assert_eq!(dbg.last_signal(), Some(signal));
        }
    }

    #[test]
    fn sigint_fires_hook_then_attempts_continue() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        // The auto-continue hits ptrace against the fake pid and fails, but
        // only after both hooks have fired.
        let res = dbg.dispatch(stopped(Signal::SIGINT));

        assert!(res.is_err());
        assert_eq!(*seen.borrow(), vec!["sigint", "continue"]);
    }

    #[test]
    fn iot_trap_fires_hook_then_attempts_continue() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        let res = dbg.dispatch(stopped(Signal::SIGABRT));

        assert!(res.is_err());
        assert_eq!(*seen.borrow(), vec!["iot_trap", "continue"]);
    }

    #[test]
    fn sigstop_fires_hook_then_attempts_wake() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        // kill(SIGCONT) against the fake pid fails after the hook.
        let res = dbg.dispatch(stopped(Signal::SIGSTOP));

        assert!(res.is_err());
        assert_eq!(*seen.borrow(), vec!["sigstop"]);
    }

    #[test]
    fn sigwinch_continues_without_hooks() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        let res = dbg.dispatch(stopped(Signal::SIGWINCH));

        assert!(res.is_err());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn sigtrap_fires_hook_before_register_read() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        let res = dbg.dispatch(stopped(Signal::SIGTRAP));

        assert!(res.is_err());
        assert_eq!(*seen.borrow(), vec!["sigtrap"]);
    }

    #[test]
    fn unrecognized_signal_is_fatal() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));
        let seen = Recorder::install(&mut dbg);

        let res = dbg.dispatch(stopped(Signal::SIGUSR1));

        assert!(matches!(
            res,
            Err(Error::UnhandledSignal { signo }) if signo == libc::SIGUSR1,
        ));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn follow_fork_rekeys_breakpoints_once() {
        let parent = Pid::from_raw(1111);
        let child = Pid::from_raw(2222);

        let mut dbg = Debugger::new(parent);
        let seen = Recorder::install(&mut dbg);

        dbg.breakpoint_set(0x1000, "first", None);
        dbg.breakpoint_set(0x2000, "second", None);

        dbg.follow_fork(child);

        assert_eq!(dbg.pid(), child);
        assert!(dbg.breakpoints().values().all(|bp| bp.pid() == child));
        assert_eq!(*seen.borrow(), vec!["fork_child 2222"]);
    }

    #[test]
    fn breakpoint_set_keeps_first_registration() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));

        dbg.breakpoint_set(0x1000, "first", None);
        dbg.breakpoint_set(0x1000, "second", None);

        assert_eq!(dbg.breakpoints().len(), 1);
        assert_eq!(dbg.breakpoints()[&0x1000].name(), "first");
    }

    #[test]
    fn breakpoint_clear_reports_missing_entry() {
        let mut dbg = Debugger::new(Pid::from_raw(NO_SUCH_PID));

        assert!(!dbg.breakpoint_clear(0x1000).unwrap());

        dbg.breakpoint_set(0x1000, "", None);

        assert!(dbg.breakpoint_clear(0x1000).unwrap());
        // The table entry survives; reaping happens in the hit protocol.
        assert_eq!(dbg.breakpoints().len(), 1);
    }

    #[test]
    fn format_registers_dumps_instruction_pointer() {
        let mut regs: Registers = unsafe { std::mem::zeroed() };
        regs.rip = 0xdead_beef;

        let dump = format_registers(&regs);

        assert!(dump.starts_with("rip 00000000deadbeef\n"));
        assert!(dump.contains("rsp 0000000000000000\n"));
    }
}
