//! Small containers the core schedules and channels on top of. These are
//! deliberately unremarkable: the hard engineering in this crate is in
//! `scheduler` and `channel`, which consume these as plain building blocks.

pub mod ring;

pub use ring::RingBuffer;
