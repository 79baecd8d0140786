//! A user-space M:N fiber runtime.
//!
//! Fibers are cooperatively scheduled user-space stacks, multiplexed over a
//! fixed pool of worker threads. Fibers never migrate between the worker
//! that created them and any other: all scheduling decisions, queue
//! splicing and context switches happen on the owning worker's own thread.
//! Cross-worker interaction (waking a fiber blocked on another worker,
//! handing off a channel send) goes through a thread-safe mailbox instead.

pub mod cell;
pub mod channel;
pub mod container;
pub mod error;
pub mod fiber;
pub mod opt;
pub mod pool;
pub mod scheduler;
pub mod worker;

pub use channel::group::{ChannelGroup, Direction};
pub use channel::Channel;
pub use error::{DerefOutcome, GroupError, PoolError, SchedulerError, SendError};
pub use pool::WorkerPool;
pub use scheduler::{
	current, die, info, join, spawn, spawn_with_stack_size, status, yield_now, BitFlags, Fiber, FiberId, FiberStatus,
	Flags, InfoKind, Word
};
pub use worker::{kthd_create, WorkerHandle, WorkerId};
