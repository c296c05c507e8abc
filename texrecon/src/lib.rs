// Library part of `texrecon`; `main.rs` wraps it into the command line tool.

pub mod export_obj;
pub mod import_obj;
pub mod mesh;
pub mod scene;
pub mod texture;
pub mod texturing;

#[cfg(test)]
pub mod test_util;

pub use base;
