pub mod assembler;
pub mod decomposer;
pub mod restart;
pub mod types;
pub mod window;
