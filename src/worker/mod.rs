//! Worker threads and the cross-worker mailbox.
//!
//! A [`Scheduler`] is confined to exactly one OS thread for its whole
//! life — fibers never migrate. Anything that needs to touch a fiber
//! living on a *different* worker goes through that worker's mailbox
//! instead: a `Mutex`-guarded FIFO of [`Message`]s, drained one at a time
//! by the worker's own idle loop. The mutex is held only for the duration
//! of a single push or pop, never across a context switch, so a mailbox
//! operation is never itself a suspension point.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use enumflags2::BitFlags;
use log::debug;

use crate::channel::Channel;
use crate::error::PoolError;
use crate::scheduler::{self, FiberId, Flags, Scheduler, Word};

/// Identifies a worker for diagnostics; carries no routing information of
/// its own (routing goes through the owning [`WorkerHandle`]'s `Arc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl std::fmt::Display for WorkerId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "worker#{}", self.0)
	}
}

/// A cross-worker scheduling operation, posted to the destination worker's
/// mailbox and re-driven on that worker's own thread. Channel state is
/// `Mutex`-protected (see `crate::channel`) and safely touched directly
/// from whichever worker happens to be sending, so only genuine
/// fiber-scheduling actions need to cross the mailbox boundary.
pub(crate) enum Message {
	Yield { key: usize, id: FiberId },
	Wakeup { key: usize, id: FiberId },
	Block { key: usize, id: FiberId }
}

struct WorkerShared {
	id: WorkerId,
	mailbox: Mutex<VecDeque<Message>>,
	activity: Condvar
}

/// A cheaply-cloned, `Send + Sync` reference to a worker's mailbox. Every
/// [`Fiber`](crate::scheduler::Fiber) handle carries one of these so that a
/// fiber on another worker can be addressed without a global registry.
#[derive(Clone)]
pub struct WorkerHandle(Arc<WorkerShared>);

impl WorkerHandle {
	fn new() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);

		Self(Arc::new(WorkerShared {
			id: WorkerId(NEXT.fetch_add(1, Ordering::Relaxed)),
			mailbox: Mutex::new(VecDeque::new()),
			activity: Condvar::new()
		}))
	}

	#[must_use]
	pub fn id(&self) -> WorkerId {
		self.0.id
	}

	/// Whether `self` and `other` name the same worker.
	#[must_use]
	pub fn same_as(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	fn mailbox(&self) -> std::sync::MutexGuard<'_, VecDeque<Message>> {
		self.0.mailbox.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Append `msg` to this worker's mailbox and wake its idle loop if it
	/// is parked waiting for activity.
	pub(crate) fn post(&self, msg: Message) {
		let mut mailbox = self.mailbox();

		mailbox.push_back(msg);
		drop(mailbox);

		self.0.activity.notify_one();
	}

	fn try_recv(&self) -> Option<Message> {
		self.mailbox().pop_front()
	}

	/// Block until the mailbox has at least one message, without spinning.
	/// Only called when the local run queue is empty but the wait queue
	/// isn't, i.e. this worker has nothing to do but wait for a remote
	/// wakeup.
	fn park_until_active(&self) {
		let mailbox = self.mailbox();

		let _guard = self
			.0
			.activity
			.wait_while(mailbox, |mailbox| mailbox.is_empty())
			.unwrap_or_else(std::sync::PoisonError::into_inner);
	}
}

/// Spawn a new worker thread running `entry(arg, chan)` as its initial
/// fiber. The initial fiber is always `NOJOIN` (nobody outside the
/// worker's own thread can join across workers, since
/// fibers and their descriptors never leave the worker that owns them),
/// and if `chan` is supplied its receivership transfers to the initial
/// fiber — a channel delegation across the worker boundary.
///
/// The native thread is started detached: dropping its `JoinHandle`
/// without joining is exactly POSIX's `pthread_detach`, so no extra API is
/// needed to express that half of the contract.
///
/// # Errors
/// If the underlying OS thread spawn fails.
pub fn kthd_create<F>(entry: F, arg: Word, chan: Option<Channel>) -> Result<WorkerHandle, PoolError>
where
	F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
{
	if let Some(chan) = &chan {
		let me = scheduler::with_current(Scheduler::current);

		chan.add_sender(me);
	}

	let shared = WorkerHandle::new();
	let thread_shared = shared.clone();

	std::thread::Builder::new()
		.name(format!("mn-core-worker-{}", shared.id()))
		.spawn(move || worker_main(thread_shared, entry, arg, chan))
		.map_err(PoolError::AllocFail)?;

	Ok(shared)
}

fn worker_main<F>(shared: WorkerHandle, entry: F, arg: Word, chan: Option<Channel>)
where
	F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
{
	crate::fiber::set_finish_hook(scheduler::finish_current_fiber);
	scheduler::install(Scheduler::new(shared.clone()));

	let initial = scheduler::with_current(|scheduler| {
		scheduler.spawn(entry, arg, BitFlags::from(Flags::NoJoin), chan)
	});

	debug!(target: "mn_core::worker", "{} started, initial fiber {}", shared.id(), initial.id());

	drive(&shared);

	debug!(target: "mn_core::worker", "{} exiting", shared.id());
}

/// The unified main/idle loop: while this worker has anything left to do,
/// drain its mailbox or hand control to a local fiber. Exits (ending the
/// worker thread) once both the wait queue and run queue are empty.
fn drive(shared: &WorkerHandle) {
	loop {
		if !scheduler::with_current(Scheduler::has_pending_work) {
			break;
		}

		if let Some(msg) = shared.try_recv() {
			scheduler::with_current(|scheduler| scheduler.dispatch_message(msg));

			continue;
		}

		let runnable = scheduler::with_current(|scheduler| scheduler.info(scheduler::InfoKind::Runnable) > 0);

		if runnable {
			scheduler::with_current(|scheduler| scheduler.yield_now(None));
		} else {
			shared.park_until_active();
		}
	}
}
