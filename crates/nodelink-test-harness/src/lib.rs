//! nodelink-test-harness: Test utilities for nodelink.
//!
//! This crate provides [`MockAmiServer`], a scripted stand-in for the
//! repeater controller's management interface, and in-memory fakes of the
//! state manager's collaborators ([`RecordingNotifier`], [`MemoryPersister`],
//! [`MemoryDirectory`]).

pub mod fakes;
pub mod mock_ami;

pub use fakes::{MemoryDirectory, MemoryPersister, RecordingNotifier};
pub use mock_ami::MockAmiServer;
