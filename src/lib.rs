#![doc = include_str!("../README.md")]

pub mod alloc;
mod buffer;
pub mod generational;
pub mod handle;
pub mod plain;
pub mod typed;
