pub mod chemistry;
pub mod domain;
pub mod error;
pub mod occupation;
pub mod spatial;
