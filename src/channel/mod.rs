//! Channels: rendezvous and bounded-ring buffered send/receive, deref-based
//! reference accounting, and receivership delegation.
//!
//! A channel's internal state lives behind a `Mutex` rather than being
//! single-owner/mailbox-mediated the way a fiber's own scheduler state is:
//! a `Channel` handle (an `Arc`) can be cloned onto another thread (it has
//! to, for delegation and for a fiber's initial inherited channel to reach
//! a newly spawned worker), and Rust requires real synchronization once
//! that's possible. See `DESIGN.md`. The lock is only ever held across a
//! short, synchronous field read/write — never across a `block()` — so the
//! worker-confined scheduler beneath it never sees a channel operation as
//! a suspension point it needs to know about.

pub mod group;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};

use crate::container::RingBuffer;
use crate::error::{DerefOutcome, SendError};
use crate::scheduler::{self, Fiber, FiberId, Scheduler, Word};
use group::{ChannelGroup, Direction};

/// A channel's payload: either a plain word, or another channel handed off
/// whole ("channel-over-channel" handoff).
#[derive(Clone)]
enum Payload {
	Word(Word),
	Channel(Channel)
}

struct GroupSlot {
	group: ChannelGroup,
	queued: bool
}

struct Inner {
	name: Option<String>,
	ring: Option<RingBuffer<Payload>>,
	snd_slot: Option<Payload>,
	snd_fifo: VecDeque<Fiber>,
	senders: HashMap<FiberId, Fiber>,
	receiver: Option<Fiber>,
	mark: Option<Word>,
	groups: [Option<GroupSlot>; 2]
}

/// A channel handle. Cheaply cloned; every clone refers to the same
/// underlying channel.
#[derive(Clone)]
pub struct Channel(Arc<Mutex<Inner>>);

impl Channel {
	/// A rendezvous channel (`capacity == 0`) or a bounded-ring buffered one
	/// (`capacity > 0`), with no diagnostic name. The calling fiber becomes
	/// the channel's receiver.
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self::named(capacity, None::<String>)
	}

	/// Like [`new`](Self::new), with a diagnostic name attached.
	#[must_use]
	pub fn named(capacity: usize, name: impl Into<Option<String>>) -> Self {
		let me = scheduler::with_current(Scheduler::current);
		let name = name.into();

		debug!(target: "mn_core::channel", "{} created by {}, capacity {capacity}, name {name:?}", if capacity == 0 { "rendezvous channel" } else { "buffered channel" }, me.id());

		Self(Arc::new(Mutex::new(Inner {
			name,
			ring: (capacity > 0).then(|| RingBuffer::new(capacity)),
			snd_slot: None,
			snd_fifo: VecDeque::new(),
			senders: HashMap::new(),
			receiver: Some(me),
			mark: None,
			groups: [None, None]
		})))
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.0.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn buffered(&self) -> bool {
		self.lock().ring.is_some()
	}

	/// This channel's diagnostic name, if any.
	#[must_use]
	pub fn name(&self) -> Option<String> {
		self.lock().name.clone()
	}

	/// How many distinct fibers have ever sent on this channel and not yet
	/// deref'd.
	#[must_use]
	pub fn sending_count(&self) -> usize {
		self.lock().senders.len()
	}

	#[must_use]
	pub fn mark_get(&self) -> Option<Word> {
		self.lock().mark
	}

	pub fn mark_set(&self, value: Option<Word>) {
		self.lock().mark = value;
	}

	/// Release the caller's claim on this channel: the receiver slot if the
	/// caller holds it, and the sender set entry if the caller is in it.
	/// Tears the channel down (dropping its buffer and group memberships)
	/// once neither a receiver nor any sender remains.
	pub fn deref(&self) -> DerefOutcome {
		let me = scheduler::with_current(Scheduler::current);
		let mut inner = self.lock();

		let was_receiver = inner.receiver.as_ref() == Some(&me);

		if was_receiver {
			inner.receiver = None;
		}

		let was_sender = inner.senders.remove(&me.id()).is_some();

		if !was_receiver && !was_sender {
			return DerefOutcome::Invalid;
		}

		if inner.receiver.is_none() && inner.senders.is_empty() {
			inner.ring = None;
			inner.snd_slot = None;
			inner.groups = [None, None];

			trace!(target: "mn_core::channel", "channel freed by {}", me.id());

			DerefOutcome::Freed
		} else {
			DerefOutcome::Kept
		}
	}

	/// Reassign this channel's receiver. Used both for delegation
	/// (`send_cdeleg`/`recv_cdeleg`) and for handing a channel to a newly
	/// spawned fiber (`Scheduler::spawn`, `worker::kthd_create`).
	pub(crate) fn redirect_receiver(&self, fiber: Fiber) {
		self.lock().receiver = Some(fiber);
	}

	/// Add `fiber` to this channel's sender set without sending anything.
	/// Used by `worker::kthd_create`, whose caller is recorded as a sender
	/// of the channel it delegates to the new worker's initial fiber.
	pub(crate) fn add_sender(&self, fiber: Fiber) {
		self.lock().senders.entry(fiber.id()).or_insert(fiber);
	}

	fn is_receiver(&self, fiber: &Fiber) -> bool {
		self.lock().receiver.as_ref() == Some(fiber)
	}

	// --- group plumbing, called from `group::ChannelGroup` ---

	pub(crate) fn group_registered(&self, dir: Direction) -> bool {
		self.lock().groups[dir.index()].is_some()
	}

	pub(crate) fn group_matches(&self, dir: Direction, group: &ChannelGroup) -> bool {
		self.lock().groups[dir.index()].as_ref().is_some_and(|slot| &slot.group == group)
	}

	pub(crate) fn set_group(&self, dir: Direction, group: ChannelGroup) {
		self.lock().groups[dir.index()] = Some(GroupSlot { group, queued: false });
	}

	pub(crate) fn clear_group(&self, dir: Direction) {
		self.lock().groups[dir.index()] = None;
	}

	pub(crate) fn has_pending_event(&self) -> bool {
		self.lock().groups.iter().any(|slot| slot.as_ref().is_some_and(|slot| slot.queued))
	}

	pub(crate) fn clear_queued_event(&self, dir: Direction) {
		if let Some(slot) = &mut self.lock().groups[dir.index()] {
			slot.queued = false;
		}
	}

	/// If this channel belongs to a group in direction `dir` and doesn't
	/// already have a pending event there, queue one and wake the group's
	/// listeners. Coalesces: a channel already flagged queued doesn't queue
	/// a second event.
	fn raise_event(&self, dir: Direction) {
		let group = {
			let mut inner = self.lock();

			match &mut inner.groups[dir.index()] {
				Some(slot) if !slot.queued => {
					slot.queued = true;

					Some(slot.group.clone())
				}
				_ => None
			}
		};

		if let Some(group) = group {
			group.notify(self.clone(), dir);
		}
	}

	// --- send ---

	/// # Errors
	/// `SelfSend` if the caller is this channel's receiver; `NoReceiver` if
	/// nobody is.
	pub fn send(&self, data: Word) -> Result<(), SendError> {
		self.send_payload(Payload::Word(data))
	}

	/// Send a channel handle as the payload (channel handoff; no semantic
	/// change from [`send`](Self::send) beyond the payload type).
	///
	/// # Errors
	/// As [`send`](Self::send).
	pub fn send_chan(&self, chan: Channel) -> Result<(), SendError> {
		self.send_payload(Payload::Channel(chan))
	}

	/// Like [`send_chan`](Self::send_chan), but also adds the caller to the
	/// delegated channel's sender set before sending it, so the delegate
	/// can be deref'd from both ends cleanly.
	///
	/// # Errors
	/// As [`send`](Self::send).
	pub fn send_cdeleg(&self, chan: Channel) -> Result<(), SendError> {
		let me = scheduler::with_current(Scheduler::current);

		chan.lock().senders.entry(me.id()).or_insert_with(|| me.clone());

		self.send_payload(Payload::Channel(chan))
	}

	fn send_payload(&self, data: Payload) -> Result<(), SendError> {
		let me = scheduler::with_current(Scheduler::current);
		let receiver = self.lock().receiver.clone().ok_or(SendError::NoReceiver)?;

		if receiver == me {
			return Err(SendError::SelfSend);
		}

		self.lock().senders.entry(me.id()).or_insert_with(|| me.clone());
		self.raise_event(Direction::Snd);

		if self.buffered() {
			self.send_buffered(&me, &receiver, data);
		} else {
			self.send_rendezvous(&me, &receiver, data);
		}

		Ok(())
	}

	fn send_rendezvous(&self, me: &Fiber, receiver: &Fiber, data: Payload) {
		self.lock().snd_fifo.push_back(me.clone());

		while self.lock().snd_fifo.front() != Some(me) {
			scheduler::with_current(Scheduler::block);
		}

		self.lock().snd_slot = Some(data);

		// A receiver already parked in `recv_rendezvous`'s outer loop only
		// notices a freshly written slot if woken: it can't poll, and the
		// fiber that becomes the FIFO head here may have been sitting
		// queued for a while (woken just to pass the gate above), well
		// after the receiver last checked and found nothing to take.
		scheduler::with_current(|scheduler| scheduler.wake(receiver));

		// Wait until the receiver has actually dequeued *us*, not for
		// `snd_slot` to read empty: with more than one sender ever queued,
		// the slot gets written again by whichever sender becomes the new
		// FIFO head, possibly before this one is rescheduled, so a bare
		// `snd_slot.is_some()` check can still read "occupied" long after
		// this send's own payload was consumed. FIFO membership doesn't
		// have that ambiguity: once the receiver pops us we never
		// reappear.
		while self.lock().snd_fifo.front() == Some(me) {
			scheduler::with_current(Scheduler::block);
		}

		trace!(target: "mn_core::channel", "{} handing off to receiver {}", me.id(), receiver.id());

		scheduler::with_current(|scheduler| scheduler.yield_now(Some(receiver)));
	}

	fn send_buffered(&self, me: &Fiber, receiver: &Fiber, data: Payload) {
		if self.lock().ring.as_ref().is_some_and(RingBuffer::is_full) {
			self.lock().snd_fifo.push_back(me.clone());

			while self.lock().ring.as_ref().is_some_and(RingBuffer::is_full) {
				scheduler::with_current(|scheduler| scheduler.block_and_wake(receiver));
			}

			self.lock().snd_fifo.retain(|fiber| fiber != me);
		}

		self.lock()
			.ring
			.as_mut()
			.expect("buffered send on a rendezvous channel")
			.push(data);

		scheduler::with_current(|scheduler| scheduler.wake(receiver));
	}

	// --- receive ---

	#[must_use]
	pub fn recv(&self) -> Word {
		match self.recv_payload() {
			Payload::Word(word) => word,
			Payload::Channel(_) => panic!("recv() on a channel whose sender sent a channel; use recv_chan")
		}
	}

	#[must_use]
	pub fn recv_chan(&self) -> Channel {
		match self.recv_payload() {
			Payload::Channel(chan) => chan,
			Payload::Word(_) => panic!("recv_chan() on a channel whose sender sent a word; use recv")
		}
	}

	/// Like [`recv_chan`](Self::recv_chan), additionally reassigning the
	/// received channel's receiver to the caller (delegation).
	#[must_use]
	pub fn recv_cdeleg(&self) -> Channel {
		let chan = self.recv_chan();
		let me = scheduler::with_current(Scheduler::current);

		chan.redirect_receiver(me);

		chan
	}

	fn recv_payload(&self) -> Payload {
		self.raise_event(Direction::Rcv);

		if self.buffered() {
			self.recv_buffered()
		} else {
			self.recv_rendezvous()
		}
	}

	fn recv_rendezvous(&self) -> Payload {
		// Both conditions, not just a nonempty FIFO: the fiber at the front
		// may have been woken to become the new head (see
		// `send_rendezvous`) but not yet actually run far enough to write
		// `snd_slot`, and `wake` only marks it runnable rather than
		// running it synchronously.
		loop {
			let inner = self.lock();

			if !inner.snd_fifo.is_empty() && inner.snd_slot.is_some() {
				break;
			}

			drop(inner);

			scheduler::with_current(Scheduler::block);
		}

		let (data, sender, new_head) = {
			let mut inner = self.lock();
			let data = inner
				.snd_slot
				.take()
				.expect("fiber at the head of the sender FIFO must have written the slot");

			let sender = inner.snd_fifo.pop_front().expect("checked nonempty above");
			let new_head = inner.snd_fifo.front().cloned();

			(data, sender, new_head)
		};

		// Wake the sender whose payload we just consumed (it's parked
		// waiting for `snd_slot` to be taken), and, if another sender is
		// now queued behind it, wake that one too: it's parked waiting to
		// become the FIFO head so it can write the slot in turn, and
		// nothing else will ever wake it up.
		scheduler::with_current(|scheduler| scheduler.wake(&sender));

		if let Some(new_head) = new_head {
			scheduler::with_current(|scheduler| scheduler.wake(&new_head));
		}

		data
	}

	fn recv_buffered(&self) -> Payload {
		while self.lock().ring.as_ref().is_some_and(RingBuffer::is_empty) {
			scheduler::with_current(Scheduler::block);
		}

		let data = self
			.lock()
			.ring
			.as_mut()
			.expect("buffered recv on a rendezvous channel")
			.pop()
			.expect("checked nonempty above");

		let unblocked_sender = self.lock().snd_fifo.pop_front();

		if let Some(sender) = unblocked_sender {
			scheduler::with_current(|scheduler| scheduler.wake(&sender));
		}

		data
	}
}

impl PartialEq for Channel {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Eq for Channel {}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel").field("name", &self.name()).finish_non_exhaustive()
	}
}

/* Safety: `Inner` is reachable only through the `Mutex`; every field is
 * itself `Send` (`Fiber`, `Channel`, and `RingBuffer<Payload>` all are). */
unsafe impl Send for Channel {}
unsafe impl Sync for Channel {}
