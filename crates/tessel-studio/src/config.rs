use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tessel_engine::render::ResizeMode;

/// Studio window configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub title: String,
    /// Logical window size; also the scene's `Fit` target.
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub resize_mode: ResizeMode,
    /// Image shown next to the generated textures.
    pub image: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            title: "tessel studio".to_string(),
            width: 960,
            height: 540,
            vsync: true,
            resize_mode: ResizeMode::Fit,
            image: None,
        }
    }
}

/// How the camera follows the drawable size.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum ResizeArg {
    Stretch,
    Expand,
    Fit,
}

impl From<ResizeArg> for ResizeMode {
    fn from(arg: ResizeArg) -> Self {
        match arg {
            ResizeArg::Stretch => ResizeMode::Stretch,
            ResizeArg::Expand => ResizeMode::Expand,
            ResizeArg::Fit => ResizeMode::Fit,
        }
    }
}

/// Interactive demo for the tessel renderer. Press `L` to toggle context loss.
#[derive(Debug, Parser)]
#[command(name = "tessel-studio", version)]
pub struct StudioArgs {
    /// Present without waiting for vertical sync.
    #[arg(long)]
    pub no_vsync: bool,

    #[arg(long, value_enum, default_value_t = ResizeArg::Fit)]
    pub resize: ResizeArg,

    /// Image file drawn next to the generated textures.
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,
}

impl From<StudioArgs> for StudioConfig {
    fn from(args: StudioArgs) -> Self {
        Self {
            vsync: !args.no_vsync,
            resize_mode: args.resize.into(),
            image: args.image,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<StudioConfig, clap::Error> {
        let argv = std::iter::once("tessel-studio").chain(args.iter().copied());
        StudioArgs::try_parse_from(argv).map(StudioConfig::from)
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), StudioConfig::default());
    }

    #[test]
    fn flags_and_image() {
        let config = parse(&["--no-vsync", "--resize", "expand", "hero.png"]).unwrap();
        assert!(!config.vsync);
        assert_eq!(config.resize_mode, ResizeMode::Expand);
        assert_eq!(config.image, Some(PathBuf::from("hero.png")));
    }

    #[test]
    fn each_resize_mode_maps() {
        for (name, mode) in [
            ("stretch", ResizeMode::Stretch),
            ("expand", ResizeMode::Expand),
            ("fit", ResizeMode::Fit),
        ] {
            assert_eq!(parse(&["--resize", name]).unwrap().resize_mode, mode);
        }
    }

    #[test]
    fn rejects_unknown_flags_and_extra_images() {
        assert!(parse(&["--fullscreen"]).is_err());
        assert!(parse(&["a.png", "b.png"]).is_err());
        assert!(parse(&["--resize", "zoom"]).is_err());
    }
}
