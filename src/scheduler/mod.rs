//! The fiber scheduler: spawn/yield/join/die and the block/wake primitives
//! everything else in the crate (channels, channel groups) is built on top
//! of.
//!
//! A [`Scheduler`] is strictly single-threaded: it lives in a worker's
//! thread-local storage (see [`crate::worker`]) and is only ever touched by
//! the OS thread that owns it. Fiber descriptors live in a `slab::Slab`
//! addressed by key rather than by pointer, so fiber identity is an opaque
//! index into a per-worker slab. The three queues (run/wait/zombie) are the
//! intrusive cursor defined in [`queue`], splicing slab keys rather than
//! raw pointers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use enumflags2::bitflags;
pub use enumflags2::BitFlags;
use log::{debug, trace, warn};
use slab::Slab;

use crate::cell::{Cell, UnsafeCell};
use crate::channel::Channel;
use crate::error::SchedulerError;
use crate::fiber;
use crate::opt::hint::unlikely;
use crate::worker::{Message, WorkerHandle};

pub(crate) mod queue;

use queue::{Queue, QueueKind};

/// A channel payload, or a fiber's argument/return value: the runtime never
/// interprets this, it's an opaque word-sized payload.
pub type Word = usize;

/// Process-wide unique fiber identity. Monotonic for the life of the
/// process, issued from a single global atomic counter regardless of
/// which worker the fiber runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u64);

impl FiberId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);

		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	/// The raw numeric id, useful for logging and diagnostics.
	#[must_use]
	pub const fn get(self) -> u64 {
		self.0
	}

	#[cfg(test)]
	pub(crate) const fn from_raw(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for FiberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "fiber#{}", self.0)
	}
}

/// A fiber's status. Declaration order matters: `join`'s wait loop compares
/// statuses with `<`, relying on `Finished` sorting after every
/// non-terminal status and before the two post-death states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FiberStatus {
	/// Descriptor allocated, not yet fully initialized; never observable
	/// through the public API, only listed here as part of the full
	/// status lattice.
	Created,
	Ready,
	Running,
	Blocked,
	Finished,
	Zombie,
	Dead
}

/// What [`info`] reports a count of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
	Runnable,
	Zombies,
	Blocked
}

/// Per-fiber behavior flags. `NONE` is simply `BitFlags::empty()`.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flags {
	/// The fiber cannot be joined, and is returned to the dead pool
	/// immediately on `die` rather than waiting as a zombie.
	NoJoin = 0b0000_0001
}

/// An opaque handle to a spawned fiber, valid for the fiber's entire
/// lifetime (including after it dies, until someone `join`s it or it is
/// recycled as `NOJOIN`). Cheap to copy; carries everything needed to
/// address the fiber's owning worker across threads.
#[derive(Clone)]
pub struct Fiber {
	pub(crate) worker: WorkerHandle,
	pub(crate) key: usize,
	pub(crate) id: FiberId
}

impl Fiber {
	/// This fiber's process-wide unique id.
	#[must_use]
	pub const fn id(&self) -> FiberId {
		self.id
	}
}

impl fmt::Debug for Fiber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Fiber").field("id", &self.id).finish_non_exhaustive()
	}
}

impl PartialEq for Fiber {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && self.key == other.key && self.worker.same_as(&other.worker)
	}
}

impl Eq for Fiber {}

/// Per-fiber scheduler bookkeeping: status, flags, join state, intrusive
/// queue links, and the raw switchable context. Addressed by `slab::Slab`
/// key from within a single worker; never shared across threads.
pub(crate) struct FiberSlot {
	id: FiberId,
	status: Cell<FiberStatus>,
	flags: Cell<BitFlags<Flags>>,
	fiber: UnsafeCell<fiber::Fiber>,
	joiner: Cell<Option<usize>>,
	retval: Cell<Option<Word>>,
	prev: Cell<Option<usize>>,
	next: Cell<Option<usize>>,
	queue_kind: Cell<Option<QueueKind>>
}

impl FiberSlot {
	fn new(id: FiberId, flags: BitFlags<Flags>, fiber: fiber::Fiber) -> Self {
		Self {
			id,
			status: Cell::new(FiberStatus::Created),
			flags: Cell::new(flags),
			fiber: UnsafeCell::new(fiber),
			joiner: Cell::new(None),
			retval: Cell::new(None),
			prev: Cell::new(None),
			next: Cell::new(None),
			queue_kind: Cell::new(None)
		}
	}

	fn into_fiber(self) -> fiber::Fiber {
		self.fiber.into_inner()
	}

	#[cfg(test)]
	pub(crate) fn test_slot(id: FiberId) -> Self {
		Self::new(id, BitFlags::empty(), fiber::Fiber::main())
	}
}

/// The entry-function envelope a spawned fiber's stack is bootstrapped
/// with: a type-erased closure plus its argument and optional inherited
/// channel, boxed and handed to the fiber as a raw pointer.
struct Envelope<F> {
	f: F,
	arg: Word,
	chan: Option<Channel>
}

/// # Safety
/// `arg` must be a `Box<Envelope<F>>` produced by [`Scheduler::spawn`]'s
/// matching monomorphization, not yet consumed.
unsafe extern "C" fn trampoline<F>(arg: *mut ()) -> usize
where
	F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
{
	/* Safety: guaranteed by caller */
	let envelope = unsafe { Box::from_raw(arg.cast::<Envelope<F>>()) };

	(envelope.f)(envelope.arg, envelope.chan)
}

/// A single worker's fiber scheduler: the run/wait/zombie queues, the slab
/// of fiber descriptors they're spliced over, and the dead-fiber recycling
/// pool. Not `Send`/`Sync` — reachable only through a worker's thread-local
/// storage (`crate::worker::with_current`).
pub(crate) struct Scheduler {
	worker: WorkerHandle,
	slab: UnsafeCell<Slab<FiberSlot>>,
	run: Queue,
	wait: Queue,
	zombie: Queue,
	current: Cell<usize>,
	/// The key of this worker's permanent driver context: the OS thread's
	/// own stack. It is never enqueued in `run`/`wait`/`zombie`; it is the
	/// fallback `dispatch` target whenever those queues have nothing left
	/// to run, unifying what might otherwise be separately named "main"
	/// and "idle" fibers into the one context that is, definitionally,
	/// what's left when no user fiber is runnable. See `DESIGN.md`.
	driver_key: usize,
	pool: UnsafeCell<fiber::Pool>
}

impl Scheduler {
	pub(crate) fn new(worker: WorkerHandle) -> Self {
		let mut slab = Slab::new();
		let driver_key = slab.insert(FiberSlot::new(FiberId::next(), BitFlags::empty(), fiber::Fiber::main()));

		slab[driver_key].status.set(FiberStatus::Running);

		Self {
			worker,
			slab: UnsafeCell::new(slab),
			run: Queue::new(QueueKind::Run),
			wait: Queue::new(QueueKind::Wait),
			zombie: Queue::new(QueueKind::Zombie),
			current: Cell::new(driver_key),
			driver_key,
			pool: UnsafeCell::new(fiber::Pool::new())
		}
	}

	/// # Safety
	/// No other `&mut Slab` may be alive.
	fn slab(&self) -> &Slab<FiberSlot> {
		/* Safety: the scheduler is only ever touched by its owning thread,
		 * and mutation through `&Slab`'s `FiberSlot` cells never requires
		 * exclusivity; `slab_mut` is only called at non-reentrant points
		 * (spawn, recycle) that hold no other live borrow. */
		unsafe { &*self.slab.get() }
	}

	#[allow(clippy::mut_from_ref)]
	fn slab_mut(&self) -> &mut Slab<FiberSlot> {
		/* Safety: see `slab` */
		unsafe { &mut *self.slab.get() }
	}

	#[allow(clippy::mut_from_ref)]
	fn pool_mut(&self) -> &mut fiber::Pool {
		/* Safety: same reasoning as `slab_mut`: only touched at spawn and
		 * at the one recycle point inside `die`, never across a switch. */
		unsafe { &mut *self.pool.get() }
	}

	fn handle(&self, key: usize) -> Fiber {
		Fiber { worker: self.worker.clone(), key, id: self.slab()[key].id }
	}

	/// A stale cross-worker message target (already recycled) is silently
	/// dropped; it is not reachable in correct usage since a `Fiber` handle
	/// keeps its slot alive until joined or `NOJOIN`-recycled, but a racing
	/// `join`/recycle against an in-flight message is possible and is not a
	/// programming error.
	fn resolve_live(&self, key: usize, id: FiberId) -> Option<usize> {
		match self.slab().get(key) {
			Some(slot) if slot.id == id => Some(key),
			_ => {
				warn!(target: "mn_core::scheduler", "dropping message for recycled fiber {id}");

				None
			}
		}
	}

	/// Switch from whatever is currently running into `next` (or the
	/// driver context if `next` is `None`). Returns once something
	/// switches back into the caller.
	fn dispatch(&self, next: Option<usize>) {
		let next_key = next.unwrap_or(self.driver_key);
		let cur_key = self.current.get();

		if unlikely(cur_key == next_key) {
			return;
		}

		self.slab()[next_key].status.set(FiberStatus::Running);
		self.current.set(next_key);

		trace!(target: "mn_core::scheduler", "switch {cur_key} -> {next_key}");

		let cur_ptr = self.slab()[cur_key].fiber.get();
		let next_ptr = self.slab()[next_key].fiber.get();

		/* Safety: `cur_key` is the fiber presently executing on this
		 * worker's OS thread; `next_key` names a live, bootstrapped fiber
		 * belonging to the same worker. */
		unsafe { (*cur_ptr).switch(&mut *next_ptr) };
	}

	/// Move the running fiber from the run queue onto the dead pool's spare
	/// list, keyed by whichever context the caller should be treated as
	/// presently running. Does not itself switch.
	fn recycle(&self, key: usize) {
		let slot = self.slab_mut().remove(key);
		let fiber = slot.into_fiber();

		self.pool_mut().recycle(fiber);
	}

	pub(crate) fn spawn<F>(&self, f: F, arg: Word, flags: BitFlags<Flags>, chan: Option<Channel>) -> Fiber
	where
		F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
	{
		self.spawn_with_stack_size(f, arg, flags, chan, fiber::DEFAULT_STACK_SIZE)
	}

	/// Like [`spawn`](Self::spawn), with a caller-chosen stack size instead of
	/// [`fiber::DEFAULT_STACK_SIZE`].
	pub(crate) fn spawn_with_stack_size<F>(
		&self, f: F, arg: Word, flags: BitFlags<Flags>, chan: Option<Channel>, stack_size: usize
	) -> Fiber
	where
		F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
	{
		let mut stack_fiber = self
			.pool_mut()
			.acquire_with_size(stack_size)
			.expect("failed to allocate a fiber stack");

		let id = FiberId::next();
		let envelope = Box::new(Envelope { f, arg, chan: chan.clone() });
		let raw = Box::into_raw(envelope).cast::<()>();

		/* Safety: `stack_fiber` was just taken from the pool, so it is not
		 * running; `raw` is a `Box<Envelope<F>>` matching `trampoline::<F>`. */
		unsafe { stack_fiber.bootstrap(trampoline::<F>, raw) };

		let key = self.slab_mut().insert(FiberSlot::new(id, flags, stack_fiber));
		let handle = self.handle(key);

		if let Some(chan) = chan.as_ref() {
			chan.redirect_receiver(handle.clone());
		}

		self.slab()[key].status.set(FiberStatus::Ready);
		self.run.inqueue(self.slab(), key);

		debug!(target: "mn_core::scheduler", "spawned {id} (flags {flags:?})");

		handle
	}

	pub(crate) fn yield_now(&self, target: Option<&Fiber>) {
		let cur_key = self.current.get();

		if cur_key != self.driver_key {
			self.run.remove(self.slab(), cur_key);
			self.run.inqueue(self.slab(), cur_key);
			self.slab()[cur_key].status.set(FiberStatus::Ready);
		}

		let mut spliced_target = None;

		if let Some(target) = target {
			if !target.worker.same_as(&self.worker) {
				target.worker.post(Message::Yield { key: target.key, id: target.id });
			} else if let Some(key) = self.resolve_live(target.key, target.id) {
				let status = self.slab()[key].status.get();

				if status == FiberStatus::Blocked {
					self.wait.remove(self.slab(), key);
					self.run.insert_before(self.slab(), self.run.peek(), key);
					self.slab()[key].status.set(FiberStatus::Ready);
					spliced_target = Some(key);
				} else if status == FiberStatus::Ready {
					self.run.remove(self.slab(), key);
					self.run.insert_before(self.slab(), self.run.peek(), key);
					spliced_target = Some(key);
				}
			}
		}

		self.dispatch(spliced_target.or_else(|| self.run.peek()));
	}

	/// Move the running fiber onto the wait queue. Falls back to the
	/// driver context if the run queue is left empty.
	pub(crate) fn block(&self) {
		let cur_key = self.current.get();

		debug_assert_ne!(cur_key, self.driver_key, "the driver context cannot block");

		self.run.remove(self.slab(), cur_key);
		self.wait.inqueue(self.slab(), cur_key);
		self.slab()[cur_key].status.set(FiberStatus::Blocked);

		self.dispatch(self.run.peek());
	}

	/// Move `key` (which must belong to this worker) onto the wait queue.
	/// If it is the currently running fiber this degenerates to `block`.
	pub(crate) fn block_target_local(&self, key: usize) {
		if key == self.current.get() {
			self.block();

			return;
		}

		self.run.remove(self.slab(), key);
		self.wait.inqueue(self.slab(), key);
		self.slab()[key].status.set(FiberStatus::Blocked);
	}

	pub(crate) fn wake(&self, target: &Fiber) {
		if !target.worker.same_as(&self.worker) {
			target.worker.post(Message::Wakeup { key: target.key, id: target.id });

			return;
		}

		let Some(key) = self.resolve_live(target.key, target.id) else {
			return;
		};

		if self.slab()[key].status.get() == FiberStatus::Blocked {
			self.wait.remove(self.slab(), key);
			self.run.inqueue(self.slab(), key);
			self.slab()[key].status.set(FiberStatus::Ready);
		}
	}

	/// Block the caller, then immediately hand control to `target` if it
	/// lives on this worker (splicing it to the run-queue head), or post a
	/// `WAKEUP` across the mailbox and pick the next local fiber otherwise.
	pub(crate) fn block_and_wake(&self, target: &Fiber) {
		let cur_key = self.current.get();

		self.run.remove(self.slab(), cur_key);
		self.wait.inqueue(self.slab(), cur_key);
		self.slab()[cur_key].status.set(FiberStatus::Blocked);

		let mut next = None;

		if target.worker.same_as(&self.worker) {
			if let Some(key) = self.resolve_live(target.key, target.id) {
				self.run.insert_before(self.slab(), self.run.peek(), key);
				self.slab()[key].status.set(FiberStatus::Ready);
				next = Some(key);
			}
		} else {
			target.worker.post(Message::Wakeup { key: target.key, id: target.id });
		}

		self.dispatch(next.or_else(|| self.run.peek()));
	}

	/// Wake every fiber on the wait queue. Used by `die` as the
	/// deadlock-avoidance escape hatch: if a worker's run queue just went
	/// empty, any cross-worker wakeup already enqueued locally gets a
	/// chance to actually run instead of the worker going idle forever.
	fn wake_all_blocked(&self) {
		while let Some(key) = self.wait.dequeue(self.slab()) {
			self.run.inqueue(self.slab(), key);
			self.slab()[key].status.set(FiberStatus::Ready);
		}
	}

	pub(crate) fn die(&self, retval: Word) -> ! {
		let cur_key = self.current.get();

		debug_assert_ne!(cur_key, self.driver_key, "the driver context cannot die");

		self.run.remove(self.slab(), cur_key);
		self.slab()[cur_key].retval.set(Some(retval));
		self.slab()[cur_key].status.set(FiberStatus::Finished);

		debug!(target: "mn_core::scheduler", "{} died, retval {retval}", self.slab()[cur_key].id);

		let joiner = self.slab()[cur_key].joiner.get();

		if let Some(joiner_key) = joiner {
			// Safety: `joiner_key` was recorded by a `join` call still
			// blocked on this exact fiber, so its slot is still live.
			let joiner_handle = self.handle(joiner_key);

			self.wake(&joiner_handle);
		} else {
			let nojoin = self.slab()[cur_key].flags.get().contains(Flags::NoJoin);

			if nojoin {
				self.slab()[cur_key].status.set(FiberStatus::Dead);
			} else {
				self.zombie.inqueue(self.slab(), cur_key);
				self.slab()[cur_key].status.set(FiberStatus::Zombie);
			}
		}

		if self.run.is_empty() {
			self.wake_all_blocked();
		}

		// If this fiber has nobody left to join it, recycle it now: pull
		// its `fiber::Fiber` out (and the dying fiber's own descriptor is
		// still a valid switch target for a moment longer) and push it
		// onto the dead pool, so the switch below saves this fiber's
		// now-irrelevant final register state into pool storage instead of
		// a slab slot we're about to discard.
		let joiner_waiting = self.slab()[cur_key].joiner.get().is_some();
		let status = self.slab()[cur_key].status.get();

		let cur_ptr = if status == FiberStatus::Dead && !joiner_waiting {
			let slot = self.slab_mut().remove(cur_key);
			let fiber = slot.into_fiber();

			self.pool_mut().recycle_for_switch(fiber)
		} else {
			self.slab()[cur_key].fiber.get()
		};

		let next_key = self.run.peek().unwrap_or(self.driver_key);

		self.slab()[next_key].status.set(FiberStatus::Running);
		self.current.set(next_key);

		let next_ptr = self.slab()[next_key].fiber.get();

		/* Safety: `cur_ptr` is either this dying fiber's own (about to be
		 * abandoned) context, or the same context relocated into the pool;
		 * either way it is valid for the duration of this call, and
		 * nothing will ever switch back into it. `next_ptr` is a live
		 * fiber belonging to this worker. */
		unsafe { (*cur_ptr).switch(&mut *next_ptr) };

		// Never reached: nobody holds a handle to the context we just
		// switched away from, so nothing will ever switch back into it.
		#[allow(clippy::unreachable)]
		{
			unreachable!("a dead fiber's stack is never resumed")
		}
	}

	pub(crate) fn join(&self, target: &Fiber) -> Result<Word, SchedulerError> {
		if !target.worker.same_as(&self.worker) {
			return Err(SchedulerError::InvalidTarget);
		}

		let cur_key = self.current.get();

		if target.key == cur_key {
			return Err(SchedulerError::InvalidTarget);
		}

		{
			let Some(slot) = self.slab().get(target.key) else {
				return Err(SchedulerError::InvalidTarget);
			};

			if slot.id != target.id || slot.status.get() == FiberStatus::Dead {
				return Err(SchedulerError::InvalidTarget);
			}

			if slot.flags.get().contains(Flags::NoJoin) {
				return Err(SchedulerError::NotJoinable);
			}

			if slot.joiner.get().is_some() {
				return Err(SchedulerError::NotJoinable);
			}

			slot.joiner.set(Some(cur_key));
		}

		while self.slab()[target.key].status.get() < FiberStatus::Finished {
			self.block();
		}

		let retval = self.slab()[target.key].retval.get().unwrap_or(0);

		if self.slab()[target.key].queue_kind.get() == Some(QueueKind::Zombie) {
			self.zombie.remove(self.slab(), target.key);
		}

		self.recycle(target.key);

		debug!(target: "mn_core::scheduler", "joined {} -> {retval}", target.id);

		Ok(retval)
	}

	pub(crate) fn current(&self) -> Fiber {
		self.handle(self.current.get())
	}

	pub(crate) fn status(&self, target: &Fiber) -> FiberStatus {
		if !target.worker.same_as(&self.worker) {
			return FiberStatus::Dead;
		}

		match self.slab().get(target.key) {
			Some(slot) if slot.id == target.id => slot.status.get(),
			_ => FiberStatus::Dead
		}
	}

	pub(crate) fn info(&self, kind: InfoKind) -> usize {
		match kind {
			InfoKind::Runnable => self.run.len(),
			InfoKind::Blocked => self.wait.len(),
			InfoKind::Zombies => self.zombie.len()
		}
	}

	/// Drive one cross-worker mailbox message to completion on this
	/// worker's own thread. Called only from the idle/driver loop.
	pub(crate) fn dispatch_message(&self, msg: Message) {
		match msg {
			Message::Yield { key, id } => {
				if let Some(key) = self.resolve_live(key, id) {
					let handle = self.handle(key);

					self.yield_now(Some(&handle));
				}
			}
			Message::Wakeup { key, id } => {
				if let Some(key) = self.resolve_live(key, id) {
					self.wake(&self.handle(key));
				}
			}
			Message::Block { key, id } => {
				if self.resolve_live(key, id).is_some() {
					self.block_target_local(key);
				}
			}
		}
	}

	/// Whether this worker still has work to do: something blocked
	/// (awaiting a remote wakeup) or runnable beyond the driver context
	/// itself.
	pub(crate) fn has_pending_work(&self) -> bool {
		!self.wait.is_empty() || self.run.len() > 0
	}
}

thread_local! {
	/// The calling OS thread's scheduler, if it is running as a
	/// `worker::Worker`. Installed once by `worker::worker_main` before any
	/// fiber is spawned, and never replaced for the lifetime of the thread.
	///
	/// Only ever `.borrow()`'d, never `.borrow_mut()`'d after installation,
	/// so a `Ref` guard held across a non-returning context switch (e.g.
	/// inside `die`) is harmless: it leaves the cell permanently "shared
	/// borrowed", which is exactly the state every later `.borrow()` needs
	/// anyway.
	static CURRENT: std::cell::RefCell<Option<Scheduler>> = const { std::cell::RefCell::new(None) };
}

/// Install `scheduler` as this OS thread's active scheduler.
///
/// # Panics
/// If called twice on the same thread.
pub(crate) fn install(scheduler: Scheduler) {
	CURRENT.with(|cell| {
		let mut slot = cell.borrow_mut();

		assert!(slot.is_none(), "a scheduler is already installed on this thread");

		*slot = Some(scheduler);
	});
}

/// Run `f` with the calling thread's active scheduler.
///
/// # Panics
/// If called from a thread with no installed scheduler.
pub(crate) fn with_current<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
	CURRENT.with(|cell| {
		let slot = cell.borrow();
		let scheduler = slot.as_ref().expect("called outside of a worker thread");

		f(scheduler)
	})
}

/// The finish hook installed on every worker thread: routes a fiber's
/// entry function returning normally into `Scheduler::die`.
pub(crate) fn finish_current_fiber(retval: Word) -> ! {
	with_current(|scheduler| scheduler.die(retval))
}

// --- public scheduler surface ---

/// Spawn a fiber on the calling thread's worker.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
pub fn spawn<F>(f: F, arg: Word, flags: BitFlags<Flags>, chan: Option<Channel>) -> Fiber
where
	F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
{
	with_current(|scheduler| scheduler.spawn(f, arg, flags, chan))
}

/// Like [`spawn`], with a caller-chosen stack size in place of
/// [`fiber::DEFAULT_STACK_SIZE`].
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
pub fn spawn_with_stack_size<F>(
	f: F, arg: Word, flags: BitFlags<Flags>, chan: Option<Channel>, stack_size: usize
) -> Fiber
where
	F: FnOnce(Word, Option<Channel>) -> Word + Send + 'static
{
	with_current(|scheduler| scheduler.spawn_with_stack_size(f, arg, flags, chan, stack_size))
}

/// Rotate the calling fiber to the tail of the run queue, optionally
/// granting the CPU immediately to `target`.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
pub fn yield_now(target: Option<&Fiber>) {
	with_current(|scheduler| scheduler.yield_now(target));
}

/// Block until `target` finishes, then recycle it and return its value.
///
/// # Errors
/// `InvalidTarget` if `target` is unjoinable on its face (self, foreign
/// worker, already recycled); `NotJoinable` if it's flagged `NoJoin` or
/// already has a joiner.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
pub fn join(target: &Fiber) -> Result<Word, SchedulerError> {
	with_current(|scheduler| scheduler.join(target))
}

/// End the calling fiber, recording `retval` for its joiner.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
pub fn die(retval: Word) -> ! {
	with_current(|scheduler| scheduler.die(retval))
}

/// The calling fiber's own handle.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
#[must_use]
pub fn current() -> Fiber {
	with_current(Scheduler::current)
}

/// `target`'s current status, or `Dead` if it belongs to another worker (a
/// cross-worker status read is inherently stale, so it's reported as the
/// only status a caller can't race against: terminal).
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
#[must_use]
pub fn status(target: &Fiber) -> FiberStatus {
	with_current(|scheduler| scheduler.status(target))
}

/// A live count of `kind` on the calling thread's worker.
///
/// # Panics
/// If called from a thread that isn't a `worker::Worker`.
#[must_use]
pub fn info(kind: InfoKind) -> usize {
	with_current(|scheduler| scheduler.info(kind))
}
