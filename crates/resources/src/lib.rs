mod assets;
mod config;
mod error;
mod event;
mod fs;
mod handle;
mod loaders;
mod manager;
mod registry;
mod resource;
mod specific;

pub use assets::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use fs::*;
pub use handle::*;
pub use loaders::*;
pub use manager::*;
pub use registry::*;
pub use resource::*;
pub use specific::*;
