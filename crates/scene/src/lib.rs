pub mod breadcrumb;
pub mod feature;
pub mod region;

pub use breadcrumb::*;
pub use feature::*;
pub use region::*;
