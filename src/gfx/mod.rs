mod buffer;
mod context;
mod error;
mod frame;
mod pipeline;
mod renderer;
mod swapchain;

pub use error::{RenderError, SelectError};
pub use renderer::{cleanup, draw_frame, init, resize, State};
