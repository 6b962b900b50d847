pub mod cache;
pub mod coordinator;
pub mod request;
pub mod source;

pub use cache::*;
pub use coordinator::*;
pub use request::*;
pub use source::*;
