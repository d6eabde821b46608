//! Compile-time configuration. The viewer intentionally has no CLI surface;
//! window and pacing parameters are fixed here.

pub const WINDOW_TITLE: &str = "meshview";
pub const WINDOW_WIDTH: u32 = 1280;
pub const WINDOW_HEIGHT: u32 = 720;

/// How far the CPU may run ahead of the GPU, in frames.
pub const FRAMES_IN_FLIGHT: usize = 2;

pub const MODEL_PATH: &str = "assets/models/cube.obj";

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
