pub mod catalog;
pub mod core;
pub mod parsers;
pub mod store;
