//! Domain types and pure logic for the 3D generation orchestration layer.
//!
//! Nothing in this crate performs I/O. The database, provider, and
//! orchestration crates build on the status machine, the update-threshold
//! policy, and the parameter helpers defined here.

pub mod error;
pub mod hashing;
pub mod image;
pub mod naming;
pub mod params;
pub mod task;
pub mod types;
