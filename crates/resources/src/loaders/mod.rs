//! Managers for the asset kinds shipped with the crate.

mod image;
mod json;
mod sprite_sheet;
mod texture;

pub use self::image::*;
pub use self::json::*;
pub use self::sprite_sheet::*;
pub use self::texture::*;
