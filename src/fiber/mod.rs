//! Fiber descriptors and the context-switch primitive.
//!
//! A fiber owns a fixed-size stack (guard-paged, mmap-backed) and a saved machine
//! context, and [`Fiber::switch`] atomically hands control from one to the
//! other. A freshly bootstrapped fiber's first resumption lands in a
//! trampoline that calls its entry function and, on return, routes the
//! result through [`mn_core_fiber_finish`].

use std::io;
use std::ptr::NonNull;

#[cfg(target_arch = "x86_64")]
#[path = "x64.rs"]
mod arch;

mod pool;
pub use pool::Pool;

use arch::Context;

/// The default fixed fiber stack size.
pub const DEFAULT_STACK_SIZE: usize = 16 * 1024;

/// A guard-paged, mmap-backed fiber stack.
///
/// The low page is mapped `PROT_NONE` so that a stack overflow faults
/// instead of silently corrupting an adjacent fiber's stack.
pub(crate) struct Stack {
	base: NonNull<u8>,
	mapped_len: usize,
	usable_len: usize
}

/* Safety: the stack is exclusively owned by whichever fiber holds it, and
 * fibers never migrate between worker threads while running, but the
 * descriptor itself is moved across threads when a channel is delegated to
 * a fiber on another worker. */
unsafe impl Send for Stack {}

impl Stack {
	fn new(size: usize) -> io::Result<Self> {
		let page = page_size();
		let usable_len = size.next_multiple_of(page).max(page);
		let mapped_len = usable_len
			.checked_add(page)
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "fiber stack size overflow"))?;

		/* Safety: standard anonymous private mapping, checked below */
		let addr = unsafe {
			libc::mmap(
				std::ptr::null_mut(),
				mapped_len,
				libc::PROT_READ | libc::PROT_WRITE,
				libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
				-1,
				0
			)
		};

		if addr == libc::MAP_FAILED {
			return Err(io::Error::last_os_error());
		}

		/* Safety: `addr` is a fresh `mapped_len`-byte mapping; the guard
		 * page is its first page. */
		let rc = unsafe { libc::mprotect(addr, page, libc::PROT_NONE) };

		if rc != 0 {
			let err = io::Error::last_os_error();

			/* Safety: tearing down the mapping we just created */
			unsafe {
				libc::munmap(addr, mapped_len);
			}

			return Err(err);
		}

		Ok(Self {
			/* Safety: mmap never returns null on success */
			base: unsafe { NonNull::new_unchecked(addr.cast()) },
			mapped_len,
			usable_len
		})
	}

	/// The exclusive top of the usable (non-guard) region. Stacks grow
	/// down from here.
	fn top(&self) -> *mut u8 {
		/* Safety: `mapped_len` bytes are valid starting at `base`; the
		 * usable region is the high `usable_len` bytes of that mapping. */
		unsafe { self.base.as_ptr().add(self.mapped_len) }
	}

	/// Hint to the kernel that the stack's contents can be dropped; the
	/// mapping itself (and its guard page) stays intact for reuse.
	///
	/// # Safety
	/// The stack must not be in use by a running fiber.
	unsafe fn advise_free(&mut self) {
		let guard_page = page_size();

		/* Safety: the region from one page above `base` to `base + mapped_len`
		 * is the usable stack, which is not currently in use */
		unsafe {
			#[allow(clippy::cast_possible_wrap)]
			libc::madvise(
				self.base.as_ptr().add(guard_page).cast(),
				self.usable_len,
				libc::MADV_DONTNEED
			);
		}
	}
}

impl Drop for Stack {
	fn drop(&mut self) {
		/* Safety: `base` owns exactly `mapped_len` bytes from construction */
		unsafe {
			libc::munmap(self.base.as_ptr().cast(), self.mapped_len);
		}
	}
}

fn page_size() -> usize {
	/* Safety: sysconf with a valid name never has preconditions beyond libc
	 * initialization, which has already happened by the time any Rust code
	 * runs */
	#[allow(clippy::cast_sign_loss)]
	unsafe {
		libc::sysconf(libc::_SC_PAGESIZE).max(4096) as usize
	}
}

/// A fiber descriptor: a saved machine context plus, unless this is a
/// worker's main fiber, the stack that context runs on.
///
/// The entry function, argument, and return-value slot live in the
/// scheduler's `FiberSlot` instead, keeping mechanism and policy apart;
/// this descriptor only stores the raw switchable context.
pub struct Fiber {
	context: Context,
	stack: Option<Stack>
}

impl Fiber {
	/// The fiber representing a worker's own OS thread stack: it is never
	/// bootstrapped and never freed, only switched into and out of.
	#[must_use]
	pub fn main() -> Self {
		Self { context: Context::empty(), stack: None }
	}

	/// Allocate a fresh fiber with a `stack_size`-byte guard-paged stack.
	///
	/// # Errors
	/// If the underlying `mmap`/`mprotect` calls fail.
	pub fn new(stack_size: usize) -> io::Result<Self> {
		Ok(Self { context: Context::empty(), stack: Some(Stack::new(stack_size)?) })
	}

	/// Lay out this fiber's stack so that its next [`switch`](Self::switch)
	/// resumes execution in `entry(arg)`.
	///
	/// # Safety
	/// The fiber must not be running, and must own a stack (not
	/// [`Fiber::main`]).
	pub unsafe fn bootstrap(&mut self, entry: unsafe extern "C" fn(*mut ()) -> usize, arg: *mut ()) {
		let stack = self
			.stack
			.as_mut()
			.expect("attempted to bootstrap a fiber with no owned stack");

		/* Safety: contract upheld by caller */
		self.context = unsafe { Context::bootstrap(stack, entry, arg) };
	}

	/// Switch from `self` (the fiber currently running on this worker) to
	/// `to`. Returns once some fiber switches back into `self`.
	///
	/// # Safety
	/// `self` must be the fiber currently executing on this OS thread; `to`
	/// must be a previously bootstrapped or previously-running fiber
	/// belonging to the same worker.
	pub unsafe fn switch(&mut self, to: &mut Self) {
		/* Safety: contract upheld by caller */
		unsafe { arch::switch(&mut self.context, &to.context) };
	}

	/// This fiber's usable stack size in bytes, or `None` for a worker's main
	/// fiber (which owns no stack of its own).
	#[must_use]
	pub fn stack_size(&self) -> Option<usize> {
		self.stack.as_ref().map(|stack| stack.usable_len)
	}

	/// Release the physical pages backing this fiber's stack back to the
	/// kernel without unmapping it, so the address range (and its guard
	/// page) can be handed to the dead-fiber pool for reuse.
	///
	/// # Safety
	/// The fiber must not be running.
	pub unsafe fn clear_stack(&mut self) {
		if let Some(stack) = self.stack.as_mut() {
			/* Safety: contract upheld by caller */
			unsafe { stack.advise_free() };
		}
	}
}

/* Safety: a fiber's stack is exclusively owned by it; descriptors are only
 * ever moved (not shared) across worker threads, e.g. when a channel is
 * delegated to a fiber that a spawning call is about to hand to a new
 * worker. */
unsafe impl Send for Fiber {}

thread_local! {
	static FINISH_HOOK: std::cell::Cell<Option<fn(usize) -> !>> = const { std::cell::Cell::new(None) };
}

/// Install the per-worker callback that a fiber's trampoline routes its
/// entry function's return value through. Called once, from
/// `worker::Worker`'s thread entry point, before any fiber is spawned.
pub(crate) fn set_finish_hook(hook: fn(usize) -> !) {
	FINISH_HOOK.with(|cell| cell.set(Some(hook)));
}

/// The landing point for every fiber's entry function returning normally.
/// Called only from the architecture-specific trampoline in `x64.s`; never
/// called directly from Rust.
///
/// # Panics
/// If no finish hook has been installed on this thread (a fiber was
/// bootstrapped and switched into outside of a `worker::Worker`).
#[no_mangle]
unsafe extern "C" fn mn_core_fiber_finish(retval: usize) -> ! {
	let hook = FINISH_HOOK.with(std::cell::Cell::get);

	match hook {
		Some(hook) => hook(retval),
		None => panic!("fiber finished with no finish hook installed on this worker thread")
	}
}
