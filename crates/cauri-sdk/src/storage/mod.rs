//! 本地存储

pub mod kv;

pub use kv::KvStore;
