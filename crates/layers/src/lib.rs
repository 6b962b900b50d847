pub mod engine;
pub mod headless;
pub mod interaction;
pub mod layer;
pub mod lifecycle;
pub mod symbology;

pub use engine::*;
pub use headless::*;
pub use interaction::*;
pub use layer::*;
pub use lifecycle::*;
pub use symbology::*;
