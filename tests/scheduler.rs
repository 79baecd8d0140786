//! Spawn/yield/join/die end-to-end behavior.

mod common;

use mn_core::{current, die, info, join, spawn, status, yield_now, BitFlags, FiberStatus, InfoKind, SchedulerError};

#[test]
fn fork_join_identity() {
	common::run_in_worker(|| {
		let child = spawn(|arg, _chan| arg, 0x37337, BitFlags::empty(), None);

		let retval = join(&child).expect("joining a freshly spawned fiber should succeed");

		assert_eq!(retval, 0x37337);

		// The joined fiber was recycled; only the calling (initial) fiber is
		// left runnable, nobody is blocked, and nothing is waiting as a
		// zombie.
		assert_eq!(info(InfoKind::Runnable), 1);
		assert_eq!(info(InfoKind::Blocked), 0);
		assert_eq!(info(InfoKind::Zombies), 0);
	});
}

#[test]
fn yield_bounce() {
	common::run_in_worker(|| {
		const ROUNDS: usize = 500;

		let a = spawn(
			|_arg, _chan| {
				for _ in 0..ROUNDS {
					yield_now(None);
				}

				1
			},
			0,
			BitFlags::empty(),
			None
		);

		let b = spawn(
			|_arg, _chan| {
				for _ in 0..ROUNDS {
					yield_now(None);
				}

				2
			},
			0,
			BitFlags::empty(),
			None
		);

		assert_eq!(join(&a).unwrap(), 1);
		assert_eq!(join(&b).unwrap(), 2);

		assert_eq!(info(InfoKind::Runnable), 1);
		assert_eq!(info(InfoKind::Blocked), 0);
		assert_eq!(info(InfoKind::Zombies), 0);
	});
}

#[test]
fn sequence_interleave_does_not_corrupt_shared_state() {
	common::run_in_worker(|| {
		use std::sync::{Arc, Mutex};

		const ROUNDS: usize = 200;

		fn bounce(my_id: u64, other_slot: usize, slots: Arc<Mutex<[u64; 2]>>) {
			for _ in 0..ROUNDS {
				slots.lock().unwrap()[my_id as usize] = my_id;

				let observed = slots.lock().unwrap()[other_slot];

				assert_ne!(observed, my_id, "fiber {my_id} observed its own id in the other slot");

				yield_now(None);
			}
		}

		let slots = Arc::new(Mutex::new([0u64, 1u64]));

		let slots_a = slots.clone();
		let slots_b = slots.clone();

		let a = spawn(move |_arg, _chan| { bounce(0, 1, slots_a); 0 }, 0, BitFlags::empty(), None);
		let b = spawn(move |_arg, _chan| { bounce(1, 0, slots_b); 0 }, 0, BitFlags::empty(), None);

		join(&a).unwrap();
		join(&b).unwrap();
	});
}

#[test]
fn nested_joins_and_directed_yield() {
	common::run_in_worker(|| {
		let inner = spawn(|_arg, _chan| 99, 0, BitFlags::empty(), None);

		// Hand control directly to `inner` so it runs to completion before
		// this fiber ever blocks in `join`.
		yield_now(Some(&inner));

		assert_eq!(status(&inner), FiberStatus::Zombie);
		assert_eq!(info(InfoKind::Zombies), 1);

		let retval = join(&inner).expect("joining a zombie should succeed");

		assert_eq!(retval, 99);
		assert_eq!(info(InfoKind::Runnable), 1);
		assert_eq!(info(InfoKind::Zombies), 0);
		assert_eq!(info(InfoKind::Blocked), 0);
	});
}

#[test]
fn join_self_is_invalid() {
	common::run_in_worker(|| {
		let me = current();

		assert_eq!(join(&me), Err(SchedulerError::InvalidTarget));
	});
}

#[test]
fn join_twice_is_not_joinable() {
	common::run_in_worker(|| {
		let target = spawn(|_arg, _chan| { yield_now(None); 0 }, 0, BitFlags::empty(), None);
		let target_for_joiner = target.clone();

		let joiner = spawn(
			move |_arg, _chan| {
				join(&target_for_joiner).expect("the first join should succeed");

				0
			},
			0,
			BitFlags::empty(),
			None
		);

		// Hand control to `joiner` so it registers itself as `target`'s
		// joiner (and blocks) before this fiber tries to join the same
		// target a second time.
		yield_now(Some(&joiner));

		assert_eq!(join(&target), Err(SchedulerError::NotJoinable));
	});
}

#[test]
fn join_nojoin_fiber_is_not_joinable() {
	common::run_in_worker(|| {
		// Checked before the target ever runs: a `NOJOIN` fiber is
		// unjoinable from the moment it's spawned, and once it does run to
		// completion it's recycled immediately (no zombie slot left to
		// query at all).
		let target = spawn(|_arg, _chan| 0, 0, BitFlags::from(mn_core::Flags::NoJoin), None);

		assert_eq!(join(&target), Err(SchedulerError::NotJoinable));
	});
}

#[test]
fn yield_null_with_a_single_fiber_is_a_noop() {
	common::run_in_worker(|| {
		yield_now(None);
		yield_now(None);

		assert_eq!(info(InfoKind::Runnable), 1);
	});
}

#[test]
fn die_return_value_is_observable_only_through_join() {
	common::run_in_worker(|| {
		let child = spawn(|arg, _chan| die(arg + 1), 41, BitFlags::empty(), None);

		assert_eq!(join(&child).unwrap(), 42);
	});
}

#[test]
fn spawn_with_stack_size_overrides_the_default() {
	common::run_in_worker(|| {
		let child = mn_core::spawn_with_stack_size(|arg, _chan| arg, 0xabc, BitFlags::empty(), None, 64 * 1024);

		assert_eq!(join(&child).unwrap(), 0xabc);
	});
}
