//! Multiplexed waiting across several channels via `ChannelGroup`.

mod common;

use mn_core::{join, spawn, BitFlags, Channel, ChannelGroup, Direction, GroupError};

#[test]
fn registering_twice_in_the_same_direction_conflicts() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let group = ChannelGroup::new();

		group.add(&chan, Direction::Snd).unwrap();

		assert_eq!(group.add(&chan, Direction::Snd), Err(GroupError::DirectionConflict));
	});
}

#[test]
fn registering_snd_direction_requires_being_the_receiver() {
	common::run_in_worker(|| {
		// `Channel::new` makes the calling (outer) fiber the receiver, so a
		// different fiber registering the same channel for `Snd` (a
		// receiver-only concern) must be rejected.
		let chan = Channel::new(0);
		let chan_for_other = chan.clone();

		let other = spawn(
			move |_arg, _chan| {
				let group = ChannelGroup::new();

				assert_eq!(group.add(&chan_for_other, Direction::Snd), Err(GroupError::DirectionConflict));

				// `Rcv` ("tell me when this channel becomes receivable") is
				// a sender's concern and has no such restriction.
				assert_eq!(group.add(&chan_for_other, Direction::Rcv), Ok(()));

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
fn free_fails_while_a_channel_is_still_registered() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let group = ChannelGroup::new();

		group.add(&chan, Direction::Snd).unwrap();

		assert_eq!(group.clone().free(), Err(GroupError::GroupBusy));

		group.remove(&chan).unwrap();

		assert_eq!(group.free(), Ok(()));
	});
}

#[test]
fn wait_reports_the_channel_a_sender_made_ready() {
	common::run_in_worker(|| {
		let chan = Channel::new(0);
		let group = ChannelGroup::new();

		// Registering for `Snd` means "tell me when this channel becomes
		// sendable", which is a receiver's concern; the calling fiber is the
		// channel's receiver by construction.
		group.add(&chan, Direction::Snd).unwrap();

		let chan_for_sender = chan.clone();

		let sender = spawn(
			move |_arg, _chan| {
				chan_for_sender.send(77).expect("send should succeed once we block waiting for it");

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		let (ready, dir) = group.wait().expect("the calling fiber is registered as a Snd listener");

		assert_eq!(ready, chan);
		assert_eq!(dir, Direction::Snd);
		assert_eq!(chan.recv(), 77);

		join(&sender).unwrap();
	});
}

#[test]
fn wait_coalesces_repeated_events_from_the_same_channel() {
	common::run_in_worker(|| {
		let chan = Channel::new(4);
		let group = ChannelGroup::new();

		group.add(&chan, Direction::Snd).unwrap();

		let chan_for_sender = chan.clone();

		let sender = spawn(
			move |_arg, _chan| {
				// Two sends before the receiver ever calls `wait`: the
				// second send finds the event already queued and doesn't
				// queue a second one, so `wait` only ever reports this
				// channel once per drain.
				chan_for_sender.send(1).unwrap();
				chan_for_sender.send(2).unwrap();

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		mn_core::yield_now(Some(&sender));

		let (ready, dir) = group.wait().expect("the calling fiber is registered as a Snd listener");

		assert_eq!(ready, chan);
		assert_eq!(dir, Direction::Snd);

		assert_eq!(chan.recv(), 1);
		assert_eq!(chan.recv(), 2);

		join(&sender).unwrap();
	});
}

#[test]
fn wait_returns_none_for_an_unregistered_caller() {
	common::run_in_worker(|| {
		// A fresh group with nothing ever added: the calling fiber isn't a
		// listener in either direction, so `wait` reports that directly
		// instead of blocking forever.
		let group = ChannelGroup::new();

		assert!(group.wait().is_none());
	});
}
