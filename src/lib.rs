//! Breakpoint-debugger engine for Linux/x86-64, built on `ptrace(2)` and procfs.
//!
//! A [`Debugger`] owns a table of software breakpoints for one tracee and a
//! synchronous wait/dispatch loop that classifies child stops and invokes
//! [`EventHooks`] callbacks. Region queries and memory scanning are layered on
//! `/proc/<pid>/maps` and `/proc/<pid>/mem`.

pub mod breakpoint;
pub mod debugger;
pub mod error;
pub mod hooks;
pub mod maps;
pub mod process;
pub mod search;

pub use breakpoint::{Breakpoint, BreakpointCallback};
pub use debugger::{
    decode_status, format_registers, Debugger, DebuggerOptions, PtraceEvent, Registers, WaitEvent,
};
pub use error::{Error, Result};
pub use hooks::EventHooks;
pub use maps::Region;
pub use process::Process;

pub use nix::sys::ptrace::Options;
pub use nix::sys::signal::Signal;
pub use nix::unistd::Pid;
