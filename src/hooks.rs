//! Extension hooks invoked by the wait/dispatch machine.

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::debugger::Debugger;

/// One method per dispatchable event, each with a no-op default body.
///
/// Implementors override only the events they care about; the dispatch
/// machine in [`Debugger::wait`] calls exactly one hook per classified stop
/// (plus [`on_continue`](EventHooks::on_continue) /
/// [`on_single_step`](EventHooks::on_single_step) whenever the tracee is
/// resumed or stepped, including auto-continues).
#[allow(unused_variables)]
pub trait EventHooks {
    fn on_attach(&mut self, dbg: &mut Debugger) {}

    fn on_detach(&mut self, dbg: &mut Debugger) {}

    fn on_continue(&mut self, dbg: &mut Debugger) {}

    fn on_single_step(&mut self, dbg: &mut Debugger) {}

    /// The tracee exited normally. Terminal.
    fn on_exit(&mut self, dbg: &mut Debugger) {}

    /// The tracee was killed by `signal` rather than stopped.
    fn on_signal(&mut self, dbg: &mut Debugger, signal: Signal) {}

    fn on_sigint(&mut self, dbg: &mut Debugger) {}

    /// Tracee stopped on `SIGSEGV`. The tracee is left stopped for
    /// inspection; resuming is the caller's decision.
    fn on_segv(&mut self, dbg: &mut Debugger) {}

    /// Tracee stopped on `SIGILL`. Left stopped, like `on_segv`.
    fn on_illegal_instruction(&mut self, dbg: &mut Debugger) {}

    fn on_sigtrap(&mut self, dbg: &mut Debugger) {}

    /// Control followed a fork: breakpoints were re-keyed and the debugger
    /// now tracks `child`.
    fn on_fork_child(&mut self, dbg: &mut Debugger, child: Pid) {}

    fn on_sigchild(&mut self, dbg: &mut Debugger) {}

    fn on_sigterm(&mut self, dbg: &mut Debugger) {}

    fn on_sigstop(&mut self, dbg: &mut Debugger) {}

    /// Abort trap (`SIGIOT`).
    fn on_iot_trap(&mut self, dbg: &mut Debugger) {}
}

/// Hook set that ignores every event. The default for a fresh [`Debugger`].
pub struct NopHooks;

impl EventHooks for NopHooks {}
