pub mod banner;
pub mod classifier;
pub mod scanner;
