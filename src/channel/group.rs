//! Channel groups: multiplexed wait across many channels in one direction.
//!
//! A group is a meeting point for two roles: receivers that
//! want to know which of several channels has become sendable (`Snd`), and
//! senders that want to know which has become receivable (`Rcv`). Each
//! direction is tracked independently with its own event queue, wait queue,
//! and listener set.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};

use super::Channel;
use crate::error::GroupError;
use crate::scheduler::{self, Fiber, FiberId, Scheduler};

/// Which event a channel's group membership reports: `Snd` for "this
/// channel became sendable" (a receiver's concern), `Rcv` for "this channel
/// became receivable" (a sender's concern).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Snd,
	Rcv
}

impl Direction {
	const ALL: [Self; 2] = [Self::Snd, Self::Rcv];

	pub(crate) fn index(self) -> usize {
		match self {
			Self::Snd => 0,
			Self::Rcv => 1
		}
	}
}

#[derive(Default)]
struct DirectionState {
	event_queue: VecDeque<Channel>,
	wait_queue: VecDeque<Fiber>,
	/// Registrant fiber ids, refcounted since one fiber may register several
	/// channels in the same direction on the same group.
	listeners: HashMap<FiberId, u32>
}

struct Inner {
	directions: [DirectionState; 2],
	channel_count: usize,
	total_events: u64
}

impl Default for Inner {
	fn default() -> Self {
		Self {
			directions: [DirectionState::default(), DirectionState::default()],
			channel_count: 0,
			total_events: 0
		}
	}
}

/// A multiplex point a fiber waits on across many channels.
#[derive(Clone)]
pub struct ChannelGroup(Arc<Mutex<Inner>>);

impl Default for ChannelGroup {
	fn default() -> Self {
		Self::new()
	}
}

impl ChannelGroup {
	#[must_use]
	pub fn new() -> Self {
		Self(Arc::new(Mutex::new(Inner::default())))
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn same_as(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Register `channel` with this group in direction `dir`.
	///
	/// # Errors
	/// `DirectionConflict` if `dir == Snd` and the caller isn't `channel`'s
	/// current receiver, or if `channel` already belongs to a group in
	/// direction `dir`.
	pub fn add(&self, channel: &Channel, dir: Direction) -> Result<(), GroupError> {
		let me = scheduler::with_current(Scheduler::current);

		if dir == Direction::Snd && !channel.is_receiver(&me) {
			return Err(GroupError::DirectionConflict);
		}

		if channel.group_registered(dir) {
			return Err(GroupError::DirectionConflict);
		}

		channel.set_group(dir, self.clone());

		let mut inner = self.lock();

		*inner.directions[dir.index()].listeners.entry(me.id()).or_insert(0) += 1;
		inner.channel_count += 1;

		trace!(target: "mn_core::channel::group", "{} registered in direction {dir:?}", me.id());

		Ok(())
	}

	/// Unregister `channel` from whichever direction(s) of this group it
	/// belongs to.
	///
	/// # Errors
	/// `GroupBusy` if either direction of `channel` still has an outstanding
	/// (undelivered) event.
	pub fn remove(&self, channel: &Channel) -> Result<(), GroupError> {
		if channel.has_pending_event() {
			return Err(GroupError::GroupBusy);
		}

		let me = scheduler::with_current(Scheduler::current);

		for dir in Direction::ALL {
			if channel.group_matches(dir, self) {
				channel.clear_group(dir);

				let mut inner = self.lock();
				let listeners = &mut inner.directions[dir.index()].listeners;

				if let Some(count) = listeners.get_mut(&me.id()) {
					*count -= 1;

					if *count == 0 {
						listeners.remove(&me.id());
					}
				}

				inner.channel_count = inner.channel_count.saturating_sub(1);
			}
		}

		Ok(())
	}

	/// Tear down this group.
	///
	/// # Errors
	/// `GroupBusy` if any channel is still registered.
	pub fn free(self) -> Result<(), GroupError> {
		if self.lock().channel_count > 0 {
			return Err(GroupError::GroupBusy);
		}

		Ok(())
	}

	/// Block until one of this group's registered channels has a pending
	/// event, then return it and which direction fired. Returns `None`
	/// without blocking if the caller isn't registered as a listener in
	/// either direction.
	pub fn wait(&self) -> Option<(Channel, Direction)> {
		let me = scheduler::with_current(Scheduler::current);

		let dir = Direction::ALL
			.into_iter()
			.find(|dir| self.lock().directions[dir.index()].listeners.contains_key(&me.id()))?;

		loop {
			let popped = self.lock().directions[dir.index()].event_queue.pop_front();

			if let Some(channel) = popped {
				channel.clear_queued_event(dir);

				let mut inner = self.lock();

				inner.total_events = inner.total_events.saturating_sub(1);
				drop(inner);

				return Some((channel, dir));
			}

			self.lock().directions[dir.index()].wait_queue.push_back(me.clone());

			scheduler::with_current(Scheduler::block);
		}
	}

	/// Called by `Channel::raise_event` when `channel` transitions from "no
	/// pending event" to "pending event" in direction `dir`.
	pub(super) fn notify(&self, channel: Channel, dir: Direction) {
		let waiters = {
			let mut inner = self.lock();

			inner.directions[dir.index()].event_queue.push_back(channel);
			inner.total_events += 1;

			inner.directions[dir.index()].wait_queue.drain(..).collect::<Vec<_>>()
		};

		debug!(target: "mn_core::channel::group", "event queued in direction {dir:?}, waking {} listener(s)", waiters.len());

		for fiber in waiters {
			scheduler::with_current(|scheduler| scheduler.wake(&fiber));
		}
	}
}

impl PartialEq for ChannelGroup {
	fn eq(&self, other: &Self) -> bool {
		self.same_as(other)
	}
}

impl Eq for ChannelGroup {}
