use std::ffi::CStr;
use std::num::NonZeroU32;

use anyhow::{Context, Result};
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use winit::window::Window;

/// GL surface and current context bound to a winit window.
///
/// Must be dropped before the window it was created for.
pub struct GlWindow {
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl GlWindow {
    /// Creates a GL 2.1 (or compatible) context current on `window`, plus the loaded `glow`
    /// function table.
    pub fn new(window: &Window, vsync: bool) -> Result<(Self, glow::Context)> {
        let raw_window = window
            .window_handle()
            .context("window has no native handle")?
            .as_raw();
        let raw_display = window
            .display_handle()
            .context("window has no display handle")?
            .as_raw();

        let display = unsafe { Display::new(raw_display, api_preference(raw_window)) }
            .context("failed to open GL display")?;

        let template = ConfigTemplateBuilder::new()
            .with_alpha_size(8)
            .with_transparency(false)
            .build();
        let config = unsafe { display.find_configs(template) }
            .context("failed to query GL configs")?
            .next()
            .context("no suitable GL config")?;

        let (width, height): (u32, u32) = window.inner_size().into();
        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window,
            non_zero(width),
            non_zero(height),
        );
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .context("failed to create window surface")?;

        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(2, 1))))
            .build(Some(raw_window));
        let context = unsafe { display.create_context(&config, &context_attributes) }
            .context("failed to create GL context")?
            .make_current(&surface)
            .context("failed to make GL context current")?;

        let interval = if vsync {
            SwapInterval::Wait(NonZeroU32::MIN)
        } else {
            SwapInterval::DontWait
        };
        match surface.set_swap_interval(&context, interval) {
            Ok(()) => log::debug!("vsync {}", if vsync { "on" } else { "off" }),
            Err(e) => log::warn!("failed to set swap interval: {e}"),
        }

        let gl = unsafe {
            glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s))
        };
        Ok((Self { surface, context }, gl))
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.surface
            .resize(&self.context, non_zero(width), non_zero(height));
    }

    pub fn swap_buffers(&self) -> Result<()> {
        self.surface
            .swap_buffers(&self.context)
            .context("failed to swap buffers")
    }
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

#[cfg(target_os = "windows")]
fn api_preference(window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Wgl(Some(window))
}

#[cfg(target_os = "macos")]
fn api_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(all(unix, not(target_os = "macos")))]
fn api_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Egl
}
