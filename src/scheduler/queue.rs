//! The run/wait/zombie queues.
//!
//! Fiber identity is an opaque index into a per-worker slab rather than a
//! raw pointer graph, and the hand-linked intrusive list is wrapped in a
//! typed cursor instead of exposed as bare prev/next fields. This is that
//! cursor: a circular, doubly-linked, head-anchored FIFO whose links live
//! inside each [`FiberSlot`](super::FiberSlot), addressed by `slab::Slab`
//! key instead of pointer.

use slab::Slab;

use super::FiberSlot;
use crate::cell::Cell;

/// Which of a worker's queues a fiber currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueKind {
	Run,
	Wait,
	Zombie
}

/// A circular doubly-linked FIFO of slab keys, anchored at `head`.
pub(crate) struct Queue {
	kind: QueueKind,
	head: Cell<Option<usize>>,
	len: Cell<usize>
}

impl Queue {
	pub(crate) const fn new(kind: QueueKind) -> Self {
		Self { kind, head: Cell::new(None), len: Cell::new(0) }
	}

	pub(crate) fn len(&self) -> usize {
		self.len.get()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.len.get() == 0
	}

	pub(crate) fn peek(&self) -> Option<usize> {
		self.head.get()
	}

	/// Append `key` at the tail. Unlike [`insert_before`](Self::insert_before)
	/// with an explicit head `victim`, this never moves `head`: the new
	/// element becomes the last one dequeued, not the next.
	pub(crate) fn inqueue(&self, slab: &Slab<FiberSlot>, key: usize) {
		match self.head.get() {
			None => {
				slab[key].prev.set(Some(key));
				slab[key].next.set(Some(key));
				self.head.set(Some(key));
			}
			Some(head) => {
				let tail = slab[head].prev.get().expect("head is linked in a queue");

				slab[tail].next.set(Some(key));
				slab[key].prev.set(Some(tail));
				slab[key].next.set(Some(head));
				slab[head].prev.set(Some(key));
			}
		}

		self.link(slab, key);
	}

	/// Splice `key` in immediately before `victim`, which must currently
	/// belong to this queue. If `victim` is the current head, `key` becomes
	/// the new head: this is how callers prepend a fiber to the very front
	/// of the run queue (e.g. a directed `yield_now`), as opposed to
	/// [`inqueue`](Self::inqueue)'s tail-append. A `None` victim degenerates
	/// to `inqueue`.
	pub(crate) fn insert_before(&self, slab: &Slab<FiberSlot>, victim: Option<usize>, key: usize) {
		let Some(victim) = victim else {
			self.inqueue(slab, key);

			return;
		};

		let prev = slab[victim].prev.get().expect("victim is not linked in a queue");

		slab[prev].next.set(Some(key));
		slab[key].prev.set(Some(prev));
		slab[key].next.set(Some(victim));
		slab[victim].prev.set(Some(key));

		if self.head.get() == Some(victim) {
			self.head.set(Some(key));
		}

		self.link(slab, key);
	}

	fn link(&self, slab: &Slab<FiberSlot>, key: usize) {
		slab[key].queue_kind.set(Some(self.kind));
		self.len.update(|n| n + 1);
	}

	/// Unlink `key`, which must currently belong to this queue.
	pub(crate) fn remove(&self, slab: &Slab<FiberSlot>, key: usize) -> usize {
		debug_assert_eq!(slab[key].queue_kind.get(), Some(self.kind));

		let prev = slab[key].prev.get().expect("key is not linked in a queue");
		let next = slab[key].next.get().expect("key is not linked in a queue");

		if prev == key {
			self.head.set(None);
		} else {
			slab[prev].next.set(Some(next));
			slab[next].prev.set(Some(prev));

			if self.head.get() == Some(key) {
				self.head.set(Some(next));
			}
		}

		slab[key].prev.set(None);
		slab[key].next.set(None);
		slab[key].queue_kind.set(None);
		self.len.update(|n| n.saturating_sub(1));

		key
	}

	/// Pop and return the head, if any.
	pub(crate) fn dequeue(&self, slab: &Slab<FiberSlot>) -> Option<usize> {
		let head = self.head.get()?;

		Some(self.remove(slab, head))
	}
}
