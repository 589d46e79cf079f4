//! Background Tasks Module
//!
//! Contains background tasks that run periodically on the remote cache peer.
//!
//! # Tasks
//! - Expiry sweep: Removes expired elements from every region at a configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
