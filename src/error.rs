//! Hand-written error enums, one per subsystem.
//!
//! The runtime has no global error channel (per the scheduler's design,
//! errors are returned, never thrown): operations that cannot make
//! progress block instead of failing, and programming errors (operating
//! on a foreign or corrupted fiber/queue) remain `debug_assert!`-style
//! assertions rather than recoverable errors.

use std::fmt;
use std::io;

/// Errors from `scheduler::join` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
	/// Operation on a null, self, dead, or otherwise unjoinable target.
	InvalidTarget,
	/// Target is flagged `NOJOIN`, or already has a joiner registered.
	NotJoinable
}

impl fmt::Display for SchedulerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::InvalidTarget => write!(f, "invalid join target"),
			Self::NotJoinable => write!(f, "target fiber is not joinable")
		}
	}
}

impl std::error::Error for SchedulerError {}

/// Errors from `Channel::send` and its variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
	/// The caller is the channel's receiver.
	SelfSend,
	/// The channel's receiver has deref'd and no longer exists.
	NoReceiver
}

impl fmt::Display for SendError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::SelfSend => write!(f, "send on a channel whose receiver is the caller"),
			Self::NoReceiver => write!(f, "send on a channel with no receiver")
		}
	}
}

impl std::error::Error for SendError {}

/// Errors from `ChannelGroup::{add, remove, free}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupError {
	/// Caller's role, or the channel's existing group membership, conflicts
	/// with the requested direction.
	DirectionConflict,
	/// Group still has live channels (`free`) or pending events (`remove`).
	GroupBusy
}

impl fmt::Display for GroupError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::DirectionConflict => write!(f, "channel group direction conflict"),
			Self::GroupBusy => write!(f, "channel group is busy")
		}
	}
}

impl std::error::Error for GroupError {}

/// Errors from worker and worker-pool construction.
#[derive(Debug)]
pub enum PoolError {
	/// Native thread spawn, or mailbox initialization, failed.
	AllocFail(io::Error)
}

impl fmt::Display for PoolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::AllocFail(err) => write!(f, "failed to allocate worker: {err}")
		}
	}
}

impl std::error::Error for PoolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::AllocFail(err) => Some(err)
		}
	}
}

/// Result of `Channel::deref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerefOutcome {
	/// Neither a receiver nor any sender remains; the channel tore down its
	/// buffer and group memberships.
	Freed,
	/// The channel is still referenced by a receiver or a sender.
	Kept,
	/// The caller held neither the receiver slot nor a sender-set entry, so
	/// this `deref` released nothing.
	Invalid
}
