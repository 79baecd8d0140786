//! Cross-worker channel delegation and the worker pool.

mod common;

use mn_core::{Channel, WorkerPool};

#[test]
fn kthd_create_delegates_receivership_to_the_new_worker() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let done = Channel::new(0);
		let done_for_worker = done.clone();

		mn_core::kthd_create(
			move |_arg, chan| {
				let chan = chan.expect("receivership should have transferred with the channel");
				let value = chan.recv();

				// Echo back over a channel this worker never owned, rather
				// than asserting here: an assertion failure on a detached
				// worker thread would just panic that thread silently and
				// hang the test waiting on `done`.
				done_for_worker.send(value + 1).unwrap();

				0
			},
			0,
			Some(chan.clone())
		)
		.expect("spawning the worker should succeed");

		// Delegation reassigned `chan`'s receiver to the new worker's
		// initial fiber, so sending from here is a genuine cross-worker
		// rendezvous, not a self-send.
		chan.send(41).expect("send should reach the delegated receiver on the other worker");

		assert_eq!(done.recv(), 42);
	});
}

#[test]
fn kthd_create_without_a_channel_passes_none_through() {
	common::run_in_worker(|| {
		let done = Channel::new(0);
		let done_for_worker = done.clone();

		mn_core::kthd_create(
			move |_arg, chan| {
				done_for_worker.send(if chan.is_none() { 1 } else { 0 }).unwrap();

				0
			},
			0,
			None
		)
		.expect("spawning the worker should succeed");

		assert_eq!(done.recv(), 1);
	});
}

#[test]
fn worker_pool_runs_submitted_items_and_shuts_down_cleanly() {
	common::run_in_worker(|| {
		let pool = WorkerPool::new();

		let done = Channel::new(0);

		for i in 0..4u64 {
			let done_for_item = done.clone();

			pool.submit(
				move |_arg, _chan| {
					done_for_item.send(i as usize).unwrap();

					0
				},
				None
			);
		}

		let mut received: Vec<usize> = (0..4).map(|_| done.recv()).collect();
		received.sort_unstable();

		assert_eq!(received, vec![0, 1, 2, 3]);

		pool.destroy().expect("destroying the pool should join its manager fiber cleanly");
	});
}

#[test]
fn worker_pool_submit_can_delegate_a_channel_to_its_worker() {
	common::run_in_worker(|| {
		let pool = WorkerPool::new();

		let chan = Channel::new(0);
		let done = Channel::new(0);
		let done_for_worker = done.clone();

		pool.submit(
			move |_arg, chan| {
				let chan = chan.expect("submitted channel should have been delegated to this worker");

				done_for_worker.send(chan.recv() * 2).unwrap();

				0
			},
			Some(chan.clone())
		);

		chan.send(21).unwrap();

		assert_eq!(done.recv(), 42);

		pool.destroy().unwrap();
	});
}
