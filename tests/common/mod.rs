//! Shared harness for this crate's integration tests.
//!
//! Every operation past channel/scheduler construction needs a scheduler
//! installed on the calling OS thread, and that only happens inside a
//! worker spawned through [`mn_core::kthd_create`]. Tests therefore run
//! their whole body as a freshly spawned worker's initial fiber and ferry
//! the outcome back to the real test thread over a `std::sync::mpsc`
//! channel — a stdlib channel, not `mn_core::Channel`, so the test thread
//! itself never needs a scheduler of its own.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Once;

static INIT: Once = Once::new();

fn init_logging() {
	INIT.call_once(|| {
		let _ = env_logger::builder().is_test(true).try_init();
	});
}

/// Run `body` to completion as a fresh worker's initial fiber, blocking the
/// calling (test-harness) thread until it finishes. A panic inside `body`
/// is caught, ferried back, and re-raised here so `#[test]` failures point
/// at the right assertion instead of just "worker thread panicked".
///
/// # Panics
/// If the worker thread fails to spawn, exits without reporting back, or
/// `body` itself panicked.
pub fn run_in_worker<F>(body: F)
where
	F: FnOnce() + Send + 'static
{
	init_logging();

	let (tx, rx) = mpsc::channel();

	mn_core::kthd_create(
		move |_arg, _chan| {
			let outcome = panic::catch_unwind(AssertUnwindSafe(body));

			// The receiving end only ever disappears if the test thread
			// itself already panicked waiting on `rx.recv()`; either way
			// there's nothing left to report to.
			let _ = tx.send(outcome);

			0
		},
		0,
		None
	)
	.expect("failed to spawn worker thread for test body");

	match rx.recv().expect("worker thread exited without reporting an outcome") {
		Ok(()) => {}
		Err(payload) => panic::resume_unwind(payload)
	}
}
