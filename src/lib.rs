//! Isoproc - run isolated units of work in throwaway child processes.
//!
//! A parent spawns a child, exchanges data over its standard streams, and
//! recovers a single structured result from the child's stderr, which may
//! also carry arbitrary diagnostic noise before and after the payload.

pub mod command;
pub mod process;
pub mod protocol;
