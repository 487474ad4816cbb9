//! Side-effecting helpers: filesystem, subprocesses, console.

pub mod certs;
pub mod compose;
pub mod config;
pub mod console;
pub mod fs_ops;
pub mod nginx;
pub mod process;
pub mod sites;
