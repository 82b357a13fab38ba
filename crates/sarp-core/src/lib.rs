pub mod cli;
pub mod sar;
