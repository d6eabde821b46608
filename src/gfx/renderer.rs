//! Renderer state and the frame loop driver: acquire, record, submit,
//! present, advance, with swapchain recreation folded in at frame
//! boundaries.

use crate::config;
use crate::gfx::buffer::{self, BufferResource};
use crate::gfx::context::{self, DeviceCaps};
use crate::gfx::error::{RenderError, SelectError};
use crate::gfx::frame::{Acquire, FrameSlot, FrameStatus, FrameSync};
use crate::gfx::pipeline::{self, MeshPush};
use crate::gfx::swapchain::{self, SurfaceConfig, SwapchainBundle};
use crate::mesh::MeshData;
use ash::{khr::surface, vk, Device, Entry, Instance};
use cgmath::{perspective, Deg, Matrix4, Point3, SquareMatrix, Vector3};
use log::{debug, info};
use std::mem;
use winit::{dpi::PhysicalSize, window::Window};

pub struct State {
    _entry: Entry,
    instance: Instance,
    debug_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface: vk::SurfaceKHR,
    surface_loader: surface::Instance,
    caps: DeviceCaps,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    command_pool: vk::CommandPool,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    swapchain: SwapchainBundle,
    frames: FrameSync,
    vertex_buffer: BufferResource,
    vertex_count: u32,
    window_size: PhysicalSize<u32>,
    /// Latch written by the resize event handler, consumed at frame
    /// boundaries. Several resizes between frames collapse to one
    /// recreation.
    resize_pending: bool,
}

pub fn init(window: &Window, mesh: &MeshData) -> Result<State, RenderError> {
    info!("Initializing Vulkan renderer...");
    let entry = Entry::linked();
    let instance = context::create_instance(&entry, window)?;
    let (debug_loader, debug_messenger) = context::setup_debug_messenger(&entry, &instance)?;
    let surface = context::create_surface(&entry, &instance, window)?;
    let surface_loader = surface::Instance::new(&entry, &instance);

    let caps = context::select_device(&instance, &surface_loader, surface)?;
    let (device, graphics_queue, present_queue) =
        context::create_logical_device(&instance, &caps)?;
    let command_pool = create_command_pool(&device, caps.graphics_family)?;

    // The render pass only depends on the surface format, which the format
    // policy fixes up front; it survives every swapchain recreation.
    let initial_config = SurfaceConfig::query(&surface_loader, caps.physical, surface)
        .map_err(SelectError::Native)?;
    let surface_format = swapchain::choose_format(&initial_config.formats)?;
    let render_pass = pipeline::create_render_pass(&device, surface_format.format)?;

    let window_size = window.inner_size();
    let swapchain = SwapchainBundle::create(
        &instance,
        &device,
        &caps,
        &surface_loader,
        surface,
        window_size,
        render_pass,
        None,
    )?;

    let (pipeline_layout, mesh_pipeline) = pipeline::create_mesh_pipeline(&device, render_pass)?;
    let frames = FrameSync::new(&device, command_pool, config::FRAMES_IN_FLIGHT)?;

    let vertices = mesh.expand();
    let vertex_count = vertices.len() as u32;
    let vertex_buffer = buffer::create_device_local_buffer(
        &instance,
        &device,
        caps.physical,
        command_pool,
        graphics_queue,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        &vertices,
    )?;

    info!(
        "Vulkan renderer initialized ({} vertices, {} frames in flight)",
        vertex_count,
        config::FRAMES_IN_FLIGHT
    );

    Ok(State {
        _entry: entry,
        instance,
        debug_loader,
        debug_messenger,
        surface,
        surface_loader,
        caps,
        device,
        graphics_queue,
        present_queue,
        command_pool,
        render_pass,
        pipeline_layout,
        pipeline: mesh_pipeline,
        swapchain,
        frames,
        vertex_buffer,
        vertex_count,
        window_size,
        resize_pending: false,
    })
}

/// Runs one iteration of the frame loop. The frame cursor advances exactly
/// once per iteration, including iterations that only recreated the
/// swapchain, so every slot's fence keeps being waited on.
pub fn draw_frame(state: &mut State) -> Result<(), RenderError> {
    if state.window_size.width == 0 || state.window_size.height == 0 {
        return Ok(());
    }

    let result = run_frame(state);
    state.frames.cursor.advance();
    result
}

fn run_frame(state: &mut State) -> Result<(), RenderError> {
    // A latched resize is handled before touching the slot: no draw this
    // frame, since the old extent is already known to be stale.
    if state.resize_pending {
        state.resize_pending = false;
        recreate_swapchain(state)?;
        return Ok(());
    }

    let slot_index = state.frames.cursor.current();
    state.frames.slots[slot_index].wait(&state.device)?;

    let (image_index, _acquired_suboptimal) =
        match state.frames.slots[slot_index].acquire(&state.swapchain)? {
            Acquire::Image { index, suboptimal } => (index, suboptimal),
            Acquire::OutOfDate => {
                // No image, no draw: the viewport cannot be set validly
                // until the new extent is known.
                recreate_swapchain(state)?;
                return Ok(());
            }
        };

    record_commands(state, &state.frames.slots[slot_index], image_index)?;

    let slot = &state.frames.slots[slot_index];
    slot.submit(&state.device, state.graphics_queue)?;
    let status = slot.present(&state.swapchain, state.present_queue, image_index)?;

    // Recreation is deferred to the frame boundary so it never interrupts
    // an in-flight submission. A suboptimal acquire alone is usable; a
    // suboptimal present is acted on here.
    if matches!(status, FrameStatus::OutOfDate | FrameStatus::Suboptimal) || state.resize_pending
    {
        state.resize_pending = false;
        recreate_swapchain(state)?;
    }

    Ok(())
}

/// Records the full per-frame command sequence against the chosen
/// framebuffer. Viewport and scissor are dynamic pipeline state and must be
/// set every frame.
fn record_commands(
    state: &State,
    slot: &FrameSlot,
    image_index: u32,
) -> Result<(), RenderError> {
    let device = &state.device;
    let cmd = slot.command_buffer;
    let extent = state.swapchain.extent;

    unsafe {
        device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        device.begin_command_buffer(
            cmd,
            &vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
        )?;

        let clear_value = vk::ClearValue {
            color: vk::ClearColorValue { float32: config::CLEAR_COLOR },
        };
        let rp_info = vk::RenderPassBeginInfo::default()
            .render_pass(state.render_pass)
            .framebuffer(state.swapchain.framebuffers[image_index as usize])
            .render_area(vk::Rect2D { offset: vk::Offset2D::default(), extent })
            .clear_values(std::slice::from_ref(&clear_value));
        device.cmd_begin_render_pass(cmd, &rp_info, vk::SubpassContents::INLINE);

        // Negative-height viewport keeps Y pointing up.
        let viewport = vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        let scissor = vk::Rect2D { offset: vk::Offset2D::default(), extent };
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, state.pipeline);
        device.cmd_bind_vertex_buffers(cmd, 0, &[state.vertex_buffer.buffer], &[0]);

        let push = camera_push(extent);
        device.cmd_push_constants(
            cmd,
            state.pipeline_layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            bytes_of(&push),
        );
        device.cmd_draw(cmd, state.vertex_count, 1, 0, 0);

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd)?;
    }
    Ok(())
}

fn camera_push(extent: vk::Extent2D) -> MeshPush {
    let aspect = extent.width as f32 / extent.height as f32;
    let projection = perspective(Deg(45.0), aspect, 0.1, 100.0);
    let view = Matrix4::look_at_rh(
        Point3::new(1.8, 1.4, 1.8),
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_y(),
    );
    let model = Matrix4::identity();
    MeshPush { mvp: projection * view * model, model }
}

#[inline(always)]
fn bytes_of<T>(v: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts((v as *const T).cast::<u8>(), mem::size_of::<T>()) }
}

/// Rebuilds the swapchain bundle as one transaction: the device is drained,
/// the new chain is created with the old handle for driver-side handoff,
/// and the old resources are destroyed only once the new ones are live.
fn recreate_swapchain(state: &mut State) -> Result<(), RenderError> {
    debug!("Recreating swapchain...");
    unsafe {
        state.device.device_wait_idle()?;
    }

    let old_handle = state.swapchain.swapchain;
    let new_bundle = SwapchainBundle::create(
        &state.instance,
        &state.device,
        &state.caps,
        &state.surface_loader,
        state.surface,
        state.window_size,
        state.render_pass,
        Some(old_handle),
    )?;

    let mut old = mem::replace(&mut state.swapchain, new_bundle);
    unsafe {
        old.destroy(&state.device);
    }

    debug!(
        "Swapchain recreated at {}x{}",
        state.swapchain.extent.width, state.swapchain.extent.height
    );
    Ok(())
}

/// Resize notification from the windowing system. Only latches the request;
/// the frame loop performs the recreation at a frame boundary. The device
/// wait keeps the latch write ordered against any outstanding submission.
pub fn resize(state: &mut State, width: u32, height: u32) {
    info!("Resize requested to {}x{}", width, height);
    state.window_size = PhysicalSize::new(width, height);
    if width > 0 && height > 0 {
        unsafe {
            let _ = state.device.device_wait_idle();
        }
        state.resize_pending = true;
    }
}

pub fn cleanup(state: &mut State) {
    info!("Cleaning up Vulkan resources...");
    unsafe {
        let _ = state.device.device_wait_idle();

        state.frames.destroy(&state.device);
        state.swapchain.destroy(&state.device);
        buffer::destroy_buffer(&state.device, &state.vertex_buffer);

        state.device.destroy_pipeline(state.pipeline, None);
        state.device.destroy_pipeline_layout(state.pipeline_layout, None);
        state.device.destroy_render_pass(state.render_pass, None);
        state.device.destroy_command_pool(state.command_pool, None);
        state.device.destroy_device(None);

        state.surface_loader.destroy_surface(state.surface, None);
        if let (Some(loader), Some(messenger)) =
            (state.debug_loader.take(), state.debug_messenger.take())
        {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        state.instance.destroy_instance(None);
    }
    info!("Vulkan resources cleaned up.");
}

fn create_command_pool(device: &Device, queue_family_index: u32) -> Result<vk::CommandPool, vk::Result> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
    unsafe { device.create_command_pool(&create_info, None) }
}
