//! The worker pool: a manager fiber that spawns a fresh worker per
//! submitted work item, with a destroy signal that ends the manager
//! cleanly and joins it.

use log::debug;

use crate::channel::Channel;
use crate::error::SchedulerError;
use crate::scheduler::{self, Fiber, Word};
use crate::worker;

type Entry = Box<dyn FnOnce(Word, Option<Channel>) -> Word + Send>;

struct WorkItem {
	entry: Entry,
	chan: Option<Channel>
}

/// The pool's control channel carries `WorkItem`s boxed and encoded as a
/// raw pointer (a word, exactly as the original C implementation passes
/// any pointer-sized payload through a channel); `0` is reserved as the
/// destroy sentinel, which no `Box::into_raw` result ever produces.
fn manager(_arg: Word, chan: Option<Channel>) -> Word {
	let control = chan.expect("worker pool manager spawned without its control channel");

	loop {
		let raw = control.recv();

		if raw == 0 {
			debug!(target: "mn_core::pool", "worker pool manager received the destroy signal");

			// Clears the receiver slot so a `submit` racing (or following)
			// this shutdown sees a proper `NoReceiver` instead of reaching a
			// sender FIFO nobody will ever drain again.
			control.deref();

			break;
		}

		/* Safety: `raw` was produced by `WorkerPool::submit`'s matching
		 * `Box::into_raw`, sent exactly once over this channel, and not yet
		 * reclaimed anywhere else. */
		let item = unsafe { Box::from_raw(raw as *mut WorkItem) };

		if let Err(err) = worker::kthd_create(item.entry, 0, item.chan) {
			debug!(target: "mn_core::pool", "worker pool failed to spawn a worker: {err}");
		}
	}

	0
}

/// A manager fiber that accepts work items and spawns a fresh worker (with
/// a fresh `NOJOIN` initial fiber) for each.
pub struct WorkerPool {
	control: Channel,
	manager: Fiber
}

impl WorkerPool {
	/// Spawn the pool's manager fiber on the calling worker.
	#[must_use]
	pub fn new() -> Self {
		let control = Channel::new(0);
		let manager = scheduler::spawn(manager, 0, scheduler::BitFlags::empty(), Some(control.clone()));

		debug!(target: "mn_core::pool", "worker pool manager {} started", manager.id());

		Self { control, manager }
	}

	/// Submit a work item: `entry` runs as the initial fiber of a freshly
	/// spawned worker, optionally inheriting `chan`'s receivership.
	pub fn submit<F>(&self, entry: F, chan: Option<Channel>)
	where
		F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
	{
		let item = Box::new(WorkItem { entry: Box::new(entry), chan });
		let raw = Box::into_raw(item) as usize;

		// Fails only if the manager has already deref'd its control
		// channel, which only `destroy` (or a prior `submit` racing one)
		// triggers. The manager never took ownership of `raw` in that case,
		// so reconstruct and drop the box rather than leak it.
		if let Err(err) = self.control.send(raw) {
			debug!(target: "mn_core::pool", "worker pool submit after shutdown: {err}");

			/* Safety: `raw` is the `Box::into_raw` pointer from just above;
			 * `send` failing means the manager never received it, so
			 * nothing else can reclaim it. */
			drop(unsafe { Box::from_raw(raw as *mut WorkItem) });
		}
	}

	/// Send the destroy signal and wait for the manager fiber to exit.
	///
	/// # Errors
	/// Propagates `scheduler::join`'s errors; only reachable if `destroy`
	/// is somehow called twice on handles sharing a manager.
	pub fn destroy(self) -> Result<(), SchedulerError> {
		let _ = self.control.send(0);

		scheduler::join(&self.manager)?;

		Ok(())
	}
}

impl Default for WorkerPool {
	fn default() -> Self {
		Self::new()
	}
}
