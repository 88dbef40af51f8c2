//! Process entry: window, input and the frame loop.
//!
//! [`run`] opens a window, creates a [`WgpuDevice`] for it, hands a fresh
//! [`RenderContext`] to the application's setup function and then renders one
//! frame per redraw until the window closes or Escape is pressed.
//!
//! Input is folded into the context's [`Viewport`] as it arrives:
//!
//! 1. cursor moves update the cursor position
//! 2. wheel scrolling accumulates until the camera consumes it
//! 3. resizes reconfigure the surface and the viewport size

use std::sync::Arc;

use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{
    context::{Config, RenderContext, Viewport},
    gpu::wgpu_device::WgpuDevice,
    render::Renderer,
};

/// Startup code run once the device exists: load materials, meshes and models.
pub type Setup = Box<dyn FnOnce(&mut RenderContext<WgpuDevice>) -> anyhow::Result<()>>;

/// Pixel scrolling (touchpads) is scaled to roughly match one wheel line.
const PIXELS_PER_LINE: f32 = 20.0;

struct AppState {
    window: Arc<Window>,
    ctx: RenderContext<WgpuDevice>,
    renderer: Renderer,
}

impl AppState {
    fn new(window: Arc<Window>, config: Config, setup: Setup) -> anyhow::Result<Self> {
        let device = futures::executor::block_on(WgpuDevice::new(window.clone()))?;
        let (width, height) = device.size();
        let mut ctx = RenderContext::new(device, config, Viewport::new(width, height));
        setup(&mut ctx)?;
        Ok(Self {
            window,
            ctx,
            renderer: Renderer::new(),
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.ctx.device.resize(width, height);
        self.ctx.viewport.resize(width, height);
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        self.renderer.render_frame(&mut self.ctx);
        self.ctx.device.present()
    }
}

pub struct App {
    config: Option<Config>,
    setup: Option<Setup>,
    state: Option<AppState>,
    last_time: Instant,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config, setup: Setup) -> Self {
        Self {
            config: Some(config),
            setup: Some(setup),
            state: None,
            last_time: Instant::now(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(config), Some(setup)) = (self.config.take(), self.setup.take()) else {
            return;
        };
        let window_attributes = Window::default_attributes().with_title(config.window_title.clone());
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };
        match AppState::new(window, config, setup) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => state.ctx.viewport.should_close = true,
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => state.ctx.viewport.should_close = true,
            WindowEvent::Resized(size) => state.resize(size.width, size.height),
            WindowEvent::CursorMoved { position, .. } => {
                state.ctx.viewport.cursor = (position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                state.ctx.viewport.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
            }
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                if dt > Duration::from_millis(100) {
                    log::trace!("slow frame: {} ms", dt.as_millis());
                }

                match state.render() {
                    Ok(()) => (),
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
                state.window.request_redraw();
            }
            _ => (),
        }

        if state.ctx.viewport.should_close {
            event_loop.exit();
        }
    }
}

/// Open a window and render until it is closed.
///
/// `setup` fills the context before the first frame; an error from it (or from
/// device creation) ends the loop and is returned.
pub fn run(
    config: Config,
    setup: impl FnOnce(&mut RenderContext<WgpuDevice>) -> anyhow::Result<()> + 'static,
) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, Box::new(setup));
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
