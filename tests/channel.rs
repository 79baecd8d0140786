//! Rendezvous and buffered channel send/receive, deref accounting, and
//! channel-over-channel delegation.

mod common;

use mn_core::{join, spawn, BitFlags, Channel, DerefOutcome, SendError};

#[test]
fn self_send_is_rejected() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);

		assert_eq!(chan.send(1), Err(SendError::SelfSend));
	});
}

#[test]
fn send_after_deref_has_no_receiver() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);

		// The calling fiber is both the only receiver and the only sender
		// so far, so a single `deref` tears the channel down completely.
		assert_eq!(chan.deref(), DerefOutcome::Freed);
		assert_eq!(chan.send(1), Err(SendError::NoReceiver));
	});
}

#[test]
fn deref_twice_is_invalid_the_second_time() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);

		assert_eq!(chan.deref(), DerefOutcome::Freed);
		assert_eq!(chan.deref(), DerefOutcome::Invalid);
	});
}

#[test]
fn deref_by_an_uninvolved_fiber_is_invalid() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let chan_for_other = chan.clone();

		let other = spawn(
			move |_arg, _chan| {
				assert_eq!(chan_for_other.deref(), DerefOutcome::Invalid);

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		join(&other).unwrap();
	});
}

#[test]
fn rendezvous_round_trip() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let chan_for_receiver = chan.clone();
		let chan_for_spawn = chan.clone();

		// Hand the channel to the new fiber through `spawn`'s `chan`
		// parameter so it becomes the registered receiver: otherwise the
		// channel's receiver stays this (the creating) fiber, and the
		// sends below would be self-sends.
		let receiver = spawn(
			move |_arg, _chan| {
				let mut values = Vec::new();

				for _ in 0..10 {
					values.push(chan_for_receiver.recv());
				}

				assert_eq!(values, (0..10).collect::<Vec<_>>());

				0
			},
			0,
			BitFlags::empty(),
			Some(chan_for_spawn)
		);

		for i in 0..10usize {
			chan.send(i).expect("send should succeed while the receiver is alive");
		}

		join(&receiver).unwrap();
	});
}

#[test]
fn concurrent_rendezvous_senders_are_all_delivered() {
	common::run_in_worker(|| {
		use std::sync::{Arc, Mutex};

		let chan = Channel::new(0);
		let chan_for_receiver = chan.clone();
		let chan_for_spawn = chan.clone();
		let received = Arc::new(Mutex::new(Vec::new()));
		let received_for_receiver = received.clone();

		let receiver = spawn(
			move |_arg, _chan| {
				for _ in 0..3 {
					let value = chan_for_receiver.recv();

					received_for_receiver.lock().unwrap().push(value);
				}

				0
			},
			0,
			BitFlags::empty(),
			Some(chan_for_spawn)
		);

		let chan_for_s1 = chan.clone();
		let chan_for_s2 = chan.clone();

		// Spawned (but not yet run) before this fiber's own send below, so
		// that by the time they do run, one becomes the FIFO head this
		// fiber's send already occupies and the other queues up *behind*
		// that head: two fibers concurrently blocked as rendezvous senders
		// on the same channel, which the receive side has to wake
		// correctly regardless of FIFO position, not just the head it
		// just dequeued.
		let s1 = spawn(move |_arg, _chan| { chan_for_s1.send(1).expect("send should succeed"); 0 }, 0, BitFlags::empty(), None);
		let s2 = spawn(move |_arg, _chan| { chan_for_s2.send(2).expect("send should succeed"); 0 }, 0, BitFlags::empty(), None);

		chan.send(0).expect("send should succeed while the receiver is alive");

		join(&receiver).unwrap();
		join(&s1).unwrap();
		join(&s2).unwrap();

		let mut values = received.lock().unwrap().clone();

		values.sort_unstable();

		assert_eq!(values, vec![0, 1, 2]);
	});
}

#[test]
fn buffered_backpressure_preserves_fifo_order() {
	common::run_in_worker(|| {
		let chan = Channel::new(3);
		let chan_for_sender = chan.clone();

		let sender = spawn(
			move |_arg, _chan| {
				for i in 0..10usize {
					chan_for_sender.send(i).expect("buffered send should succeed");
				}

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		// Let the sender run ahead and fill (and block on) the ring before
		// this fiber starts draining it.
		mn_core::yield_now(Some(&sender));

		let received: Vec<usize> = (0..10).map(|_| chan.recv()).collect();

		assert_eq!(received, (0..10).collect::<Vec<_>>());

		join(&sender).unwrap();
	});
}

#[test]
fn channel_over_channel_round_trip_reassigns_receivership() {
	common::run_in_worker(|| {
		let control = Channel::new(0);
		let inner = Channel::new(0);

		let control_for_sender = control.clone();
		let inner_for_sender = inner.clone();

		let sender = spawn(
			move |_arg, _chan| {
				control_for_sender
					.send_cdeleg(inner_for_sender)
					.expect("delegating a channel handle should succeed");

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		let received = control.recv_cdeleg();

		// Identical underlying channel, handed back whole.
		assert_eq!(received, inner);

		// `send_cdeleg` adds its caller to the delegate's sender set, so
		// after delegation the delegate has exactly one registered sender
		// (the `sender` fiber), and `recv_cdeleg` reassigned its receiver
		// to this fiber: sending on it from here is now a self-send.
		assert_eq!(received.sending_count(), 1);
		assert_eq!(received.send(0), Err(SendError::SelfSend));

		join(&sender).unwrap();
	});
}

#[test]
fn mark_round_trips_through_a_delegated_channel() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);

		assert_eq!(chan.mark_get(), None);

		chan.mark_set(Some(7));

		assert_eq!(chan.mark_get(), Some(7));
	});
}

#[test]
fn named_channel_reports_its_name() {
	common::run_in_worker(|| {
		let chan = Channel::named(0, "diagnostics");

		assert_eq!(chan.name().as_deref(), Some("diagnostics"));
	});
}
