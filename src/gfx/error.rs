use ash::vk;
use thiserror::Error;

/// Startup selection failures. These are fatal: the viewer has no fallback
/// device or format policy.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no device exposes graphics and presentation for this surface")]
    NoSuitableDevice,
    #[error("surface has no 8-bit BGRA sRGB format")]
    NoCompatibleFormat,
    #[error("vulkan call failed: {0}")]
    Native(#[from] vk::Result),
}

/// Everything the renderer can fail with after startup. Out-of-date and
/// suboptimal presentation results are recovered internally by swapchain
/// recreation and never appear here.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("vulkan call failed: {0}")]
    Native(#[from] vk::Result),
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("invalid SPIR-V blob: {0}")]
    Shader(std::io::Error),
    #[error("no memory type satisfies {required:?}")]
    NoSuitableMemoryType { required: vk::MemoryPropertyFlags },
}
