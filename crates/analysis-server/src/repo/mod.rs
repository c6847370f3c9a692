//! Repository modules for database operations.

pub mod games;

pub use games::GameRepo;
