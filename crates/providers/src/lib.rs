//! LLM provider implementations for cadence.
//!
//! All providers implement the `cadence_core::Provider` trait. Only an offline
//! mock backend ships here; real protocols plug in behind the same trait.

pub mod mock;

pub use mock::MockProvider;
