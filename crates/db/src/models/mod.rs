//! Domain model structs and DTOs.
//!
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A summary projection used by listings
//! - Create and update DTOs

pub mod task;
