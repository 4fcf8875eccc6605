pub mod archive;
pub mod handlers;
pub mod hot_store;
pub mod service;
