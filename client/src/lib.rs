mod app;
pub mod comments;
pub mod config;
mod dom;
pub mod error;
pub mod geometry;
pub mod layers;
pub mod mask;
pub mod net;
pub mod palette;
pub mod render;
pub mod session;
pub mod state;
pub mod stroke;
pub mod sync;
#[cfg(test)]
mod testing;
mod ws;

pub use app::{run, Annotator};
