use std::io;

use nix::unistd::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not attach to tracee = {pid}")]
    Attach {
        pid: Pid,
        source: nix::Error,
    },

    #[error("No handler in the dispatch table for signal = {signo}")]
    UnhandledSignal { signo: i32 },

    #[error("Operation requires a nonzero pid")]
    InvalidPid,

    #[error("Malformed maps entry: {line}")]
    MapsFormat { line: String },

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
