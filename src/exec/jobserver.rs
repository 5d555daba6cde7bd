// src/exec/jobserver.rs

//! GNU-make-style jobserver: a pipe shared across the whole build's
//! process tree whose bytes are job-slot tokens.
//!
//! Every process additionally holds one implicit token, never backed by
//! I/O, representing the process itself. Acquiring prefers the implicit
//! token; releasing returns a byte to the pipe (or restores the implicit
//! token when there is no pipe). Every acquired token must be released
//! exactly once: a leak permanently under-utilizes parallelism, a double
//! release over-subscribes it.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{trace, warn};

#[derive(Debug)]
pub struct Jobserver {
    reader: Option<OwnedFd>,
    writer: Option<OwnedFd>,
    implicit: u32,
}

impl Jobserver {
    /// No pipe: only the implicit token exists, builds are serial.
    pub fn serial() -> Self {
        Self {
            reader: None,
            writer: None,
            implicit: 1,
        }
    }

    /// Create a fresh token pipe for `limit` concurrent jobs: the implicit
    /// token plus `limit - 1` bytes.
    pub fn with_limit(limit: u32) -> io::Result<Self> {
        let (reader, writer) = nix::unistd::pipe().map_err(io::Error::from)?;
        let mut js = Self {
            reader: Some(reader),
            writer: Some(writer),
            implicit: 1,
        };
        for _ in 1..limit {
            js.release();
        }
        Ok(js)
    }

    /// Adopt the pipe ends inherited from a parent invocation
    /// (`REDOFLAGS=--jobserver-fds=R,W`). The descriptors are owned from
    /// here on and closed on drop.
    pub fn from_inherited(read_fd: RawFd, write_fd: RawFd) -> io::Result<Self> {
        let reader = unsafe { OwnedFd::from_raw_fd(read_fd) };
        let writer = if write_fd == read_fd {
            reader.try_clone()?
        } else {
            unsafe { OwnedFd::from_raw_fd(write_fd) }
        };
        Ok(Self {
            reader: Some(reader),
            writer: Some(writer),
            implicit: 1,
        })
    }

    /// Pipe descriptor numbers to advertise to child scripts.
    pub fn pipe_fds(&self) -> Option<(RawFd, RawFd)> {
        match (&self.reader, &self.writer) {
            (Some(r), Some(w)) => Some((r.as_raw_fd(), w.as_raw_fd())),
            _ => None,
        }
    }

    /// Non-blocking probe: take a token if one is immediately available.
    pub fn try_acquire(&mut self) -> bool {
        if self.implicit > 0 {
            self.implicit -= 1;
            trace!("re-using implicit job slot");
            return true;
        }
        let Some(reader) = &self.reader else {
            return false;
        };
        let mut fds = [PollFd::new(reader.as_fd(), PollFlags::POLLIN)];
        let readable = matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
            && fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN));
        if !readable {
            return false;
        }
        self.read_token()
    }

    /// Block until a token is available. Returns false only when the pipe
    /// is unusable (no jobserver, or its write ends all vanished).
    pub fn acquire(&mut self) -> bool {
        if self.implicit > 0 {
            self.implicit -= 1;
            trace!("re-using implicit job slot");
            return true;
        }
        if self.reader.is_none() {
            return false;
        }
        self.read_token()
    }

    /// Return one token.
    pub fn release(&mut self) {
        match &self.writer {
            Some(writer) => {
                let mut file = match clone_as_file(writer) {
                    Ok(f) => f,
                    Err(err) => {
                        warn!(error = %err, "failed to return a job slot to the jobserver");
                        return;
                    }
                };
                if let Err(err) = file.write_all(&[0u8]) {
                    warn!(error = %err, "failed to return a job slot to the jobserver");
                } else {
                    trace!("vacated a job slot to the jobserver");
                }
            }
            None => self.implicit += 1,
        }
    }

    /// Withdraw one slot before the process exits: the implicit token dies
    /// with the process, so a token previously released in its place must
    /// be taken back out of circulation.
    pub fn reclaim(&mut self) {
        let _ = self.acquire();
    }

    fn read_token(&mut self) -> bool {
        let Some(reader) = &self.reader else {
            return false;
        };
        let mut file = match clone_as_file(reader) {
            Ok(f) => f,
            Err(err) => {
                warn!(error = %err, "failed to procure a job slot from the jobserver");
                return false;
            }
        };
        let mut byte = [0u8; 1];
        match file.read(&mut byte) {
            Ok(n) if n > 0 => {
                trace!("procured a job slot from the jobserver");
                true
            }
            Ok(_) => false,
            Err(err) => {
                warn!(error = %err, "failed to procure a job slot from the jobserver");
                false
            }
        }
    }
}

/// Duplicate a pipe end so std I/O can be used without giving up the fd.
fn clone_as_file(fd: &OwnedFd) -> io::Result<File> {
    Ok(File::from(fd.try_clone()?))
}
