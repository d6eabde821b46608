use crate::{config, gfx, mesh};
use log::{error, info};
use std::{error::Error, path::Path, sync::Arc, time::Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<gfx::State>,
    mesh: mesh::MeshData,
    frame_count: u32,
    last_title_update: Instant,
}

impl App {
    fn new(mesh: mesh::MeshData) -> Self {
        Self {
            window: None,
            renderer: None,
            mesh,
            frame_count: 0,
            last_title_update: Instant::now(),
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title(config::WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(config::WINDOW_WIDTH, config::WINDOW_HEIGHT))
            .with_resizable(true);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let renderer = gfx::init(&window, &self.mesh)?;

        self.window = Some(window);
        self.renderer = Some(renderer);
        info!("Starting event loop...");
        Ok(())
    }

    fn update_fps_title(&mut self, window: &Window, now: Instant) {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_title_update);
        if elapsed.as_secs_f32() >= 1.0 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            window.set_title(&format!("{} | {:.2} FPS", config::WINDOW_TITLE, fps));
            self.frame_count = 0;
            self.last_title_update = now;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_graphics(event_loop) {
                error!("Failed to initialize graphics: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref().cloned() else { return };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = &mut self.renderer {
                    gfx::resize(renderer, new_size.width, new_size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                self.update_fps_title(&window, now);
                if let Some(renderer) = &mut self.renderer {
                    if let Err(e) = gfx::draw_frame(renderer) {
                        error!("Failed to draw frame: {}", e);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &mut self.renderer {
            gfx::cleanup(renderer);
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let mesh = mesh::obj::load(Path::new(config::MODEL_PATH))?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(mesh);
    event_loop.run_app(&mut app)?;
    Ok(())
}
