// src/exec/mod.rs

//! Process-level machinery: job-slot tokens, script spawning, the
//! scheduler loop.

pub mod job;
pub mod jobserver;
pub mod process;
pub mod scheduler;
