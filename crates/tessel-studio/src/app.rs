use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use tessel_engine::device::{GlowBackend, ManagedContext};
use tessel_engine::paint::Color;
use tessel_engine::render::{SceneConfig, SceneRenderer};

use crate::clock::FrameClock;
use crate::config::StudioConfig;
use crate::demo::Demo;
use crate::gl_window::GlWindow;

const CLEAR: Color = Color::new(0.12, 0.12, 0.14, 1.0);
const CLEAR_LOST: Color = Color::new(0.35, 0.05, 0.05, 1.0);
const FPS_EVERY: Duration = Duration::from_secs(5);

/// Window, GL context and scene. Fields drop top to bottom: GPU resources go while the
/// context is still current, and the window goes last.
struct Running {
    demo: Demo,
    scene: SceneRenderer,
    ctx: Rc<ManagedContext>,
    gl_window: GlWindow,
    window: Window,
    clock: FrameClock,
    simulated_loss: bool,
}

/// winit application driving one studio window.
pub struct Studio {
    config: StudioConfig,
    running: Option<Running>,
    failure: Option<anyhow::Error>,
}

impl Studio {
    pub fn new(config: StudioConfig) -> Self {
        Self {
            config,
            running: None,
            failure: None,
        }
    }

    /// Error that stopped the event loop, if any.
    pub fn into_result(self) -> Result<()> {
        self.failure.map_or(Ok(()), Err)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.failure.get_or_insert(error);
        event_loop.exit();
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let config = &self.config;
        let attrs = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height));
        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let (gl_window, gl) = GlWindow::new(&window, config.vsync)?;
        let ctx = ManagedContext::new(GlowBackend::new(gl));

        let mut scene = SceneRenderer::new(
            &ctx,
            config.width as f32,
            config.height as f32,
            SceneConfig::default(),
        )
        .context("failed to create scene renderer")?;
        let size = window.inner_size();
        scene.resize(config.resize_mode, size.width, size.height);

        let demo = Demo::new(&ctx, config.image.as_deref())?;
        log::info!("press L to simulate a context loss, Esc to quit");

        Ok(Running {
            demo,
            scene,
            ctx,
            gl_window,
            window,
            clock: FrameClock::new(),
            simulated_loss: false,
        })
    }
}

impl Running {
    fn resize(&mut self, width: u32, height: u32, config: &StudioConfig) {
        if width == 0 || height == 0 {
            return;
        }
        self.gl_window.resize(width, height);
        self.scene.resize(config.resize_mode, width, height);
        self.window.request_redraw();
    }

    /// `L`: first press loses the context, second press restores it.
    fn toggle_loss(&mut self) {
        if self.simulated_loss {
            let report = self.ctx.mark_restored();
            log::info!(
                "context restored: {} resource(s), {} failure(s), {} pruned",
                report.restored,
                report.failures.len(),
                report.pruned
            );
            for (label, error) in &report.failures {
                log::error!("restore {label}: {error}");
            }
            self.clock.reset();
        } else {
            self.ctx.mark_lost();
        }
        self.simulated_loss = !self.simulated_loss;
    }

    fn frame(&mut self) -> Result<()> {
        let dt = self.clock.tick();
        if let Some(fps) = self.clock.fps(FPS_EVERY) {
            log::debug!("frame {}: {fps:.1} fps", self.clock.frame_index());
        }

        let clear = if self.ctx.is_lost() { CLEAR_LOST } else { CLEAR };
        self.ctx.gl().clear(clear.to_array());

        self.demo.update(dt);
        self.scene.begin()?;
        self.demo.draw(&mut self.scene)?;
        self.scene.end()?;

        self.gl_window.swap_buffers()
    }
}

impl ApplicationHandler for Studio {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                running.scene.dispose();
                self.running = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => running.resize(size.width, size.height, &self.config),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = running.window.inner_size();
                running.resize(size.width, size.height, &self.config);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::KeyL => running.toggle_loss(),
                KeyCode::Escape => event_loop.exit(),
                _ => {}
            },
            WindowEvent::RedrawRequested => {
                if let Err(e) = running.frame() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }
}
