//! Command-line front end for the fleet admin client.
//!
//! The `gsadmin` binary starts jobs, follows them through the
//! [`JobTracker`](gsadmin_jobs::JobTracker) and tails container logs
//! over the push channel.

pub mod cli;
pub mod commands;
pub mod exit_codes;
pub mod logging;
