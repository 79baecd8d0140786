//! Per-worker recycling pool of fiber stacks, seeded in batches of
//! [`Pool::BATCH`].
//!
//! Not shared across threads: each worker owns exactly one, so no mutex
//! is needed.

use std::io;

use log::trace;

use super::{Fiber, DEFAULT_STACK_SIZE};

pub struct Pool {
	free: Vec<Fiber>,
	/// Custom-stack-size fibers that were the "current" side of a final
	/// `die` switch: they can't be freed while still executing on their own
	/// stack, but they also don't belong in `free` (a mixed-size free list
	/// would hand out the wrong size). Parked here instead, to be dropped
	/// (and their mapping unmapped) only when the whole pool goes away at
	/// worker shutdown.
	retired: Vec<Fiber>
}

impl Pool {
	/// Batch size a pool refills by when empty.
	pub const BATCH: usize = 64;

	pub(crate) fn new() -> Self {
		Self { free: Vec::with_capacity(Self::BATCH), retired: Vec::new() }
	}

	/// Take a fiber descriptor and stack for a caller-chosen `stack_size`.
	/// Only [`DEFAULT_STACK_SIZE`] stacks are drawn from (and later returned
	/// to) the batched free list, refilled in a batch of [`Self::BATCH`]
	/// when empty; any other size is allocated fresh and, on
	/// [`recycle`](Self::recycle), freed immediately rather than pooled,
	/// since a pool of mixed stack sizes would hand out the wrong size on a
	/// later default-size `acquire_with_size`.
	pub(crate) fn acquire_with_size(&mut self, stack_size: usize) -> io::Result<Fiber> {
		if stack_size != DEFAULT_STACK_SIZE {
			trace!(target: "mn_core::fiber", "allocating a one-off {stack_size}-byte stack outside the pool");

			return Fiber::new(stack_size);
		}

		if let Some(mut fiber) = self.free.pop() {
			trace!(target: "mn_core::fiber", "reusing a stack from the pool");

			/* Safety: a fiber only ever sits in `free` once it is no
			 * longer running (either never started, or `die`'d and
			 * relocated here before its final switch-away). */
			unsafe { fiber.clear_stack() };

			return Ok(fiber);
		}

		trace!(target: "mn_core::fiber", "pool empty, allocating a batch of {}", Self::BATCH);

		for _ in 0..Self::BATCH.saturating_sub(1) {
			self.free.push(Fiber::new(DEFAULT_STACK_SIZE)?);
		}

		Fiber::new(DEFAULT_STACK_SIZE)
	}

	/// Return a dead fiber's descriptor and stack to the pool for reuse, if
	/// it's a default-size stack; a custom-size stack is dropped (and its
	/// mapping freed) immediately instead.
	pub(crate) fn recycle(&mut self, fiber: Fiber) {
		if fiber.stack_size() == Some(DEFAULT_STACK_SIZE) {
			self.free.push(fiber);
		}
	}

	/// Like [`recycle`](Self::recycle), but returns a raw pointer to the
	/// now-pool-owned fiber so the caller (`Scheduler::die`) can use it as
	/// the "current" side of one last context switch. The dying fiber must
	/// not free its own stack while still executing on it, so relocating it
	/// here *before* switching away, rather than after, is what makes that
	/// switch safe: the stack's physical pages are untouched, only the
	/// Rust-level descriptor moves.
	pub(crate) fn recycle_for_switch(&mut self, fiber: Fiber) -> *mut Fiber {
		let list = if fiber.stack_size() == Some(DEFAULT_STACK_SIZE) { &mut self.free } else { &mut self.retired };

		list.push(fiber);

		let fiber: &mut Fiber = list.last_mut().expect("just pushed an element");

		std::ptr::from_mut(fiber)
	}
}
