pub mod config;
pub mod explorer;
pub mod machine;
pub mod url_state;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use explorer::*;
pub use machine::*;
pub use url_state::*;
