pub mod cli;
pub mod fs;
