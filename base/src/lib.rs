pub mod defs;
pub mod store;
pub mod util;
