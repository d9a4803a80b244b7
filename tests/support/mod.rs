#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use bracken::{Debugger, EventHooks, Pid, Signal};

pub type Events = Rc<RefCell<Vec<String>>>;

/// Hook set that records the name of every event it sees, in order.
pub struct Recorder {
    seen: Events,
}

impl Recorder {
    /// Install a fresh recorder on `dbg` and hand back its event log.
    pub fn install(dbg: &mut Debugger) -> Events {
        let seen: Events = Rc::new(RefCell::new(Vec::new()));

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
