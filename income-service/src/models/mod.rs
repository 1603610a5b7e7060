pub mod addon;
pub mod invoice;
pub mod journal;
pub mod package;
pub mod subscription;

pub use addon::*;
pub use invoice::*;
pub use journal::*;
pub use package::*;
pub use subscription::*;
