//! Shared services used across matplan clients

pub mod handle;
mod store;

pub use store::StoreService;
