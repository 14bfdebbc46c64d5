pub mod data;
pub mod io;


pub use data::{Config, Overrides};
pub use io::ConfigError;
