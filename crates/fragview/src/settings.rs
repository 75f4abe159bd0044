use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use renderer::{Color, EngineOptions, GpuPowerPreference, TextureBinding, WgpuOptions};
use viewconfig::{PowerPreference, ViewConfig};

use crate::cli::Cli;

/// Configuration file merged with command-line overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub fragment: PathBuf,
    pub vertex: Option<PathBuf>,
    pub size: (u32, u32),
    pub title: String,
    pub textures: Vec<(String, PathBuf)>,
    pub background: Color,
    pub power: GpuPowerPreference,
    pub vsync: bool,
    pub start_paused: bool,
    pub reload_interval: Duration,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => ViewConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ViewConfig::default(),
        };
        Self::merge(cli, config)
    }

    fn merge(cli: &Cli, config: ViewConfig) -> Result<Self> {
        let fragment = cli
            .shader
            .clone()
            .or(config.shader.fragment)
            .context("no fragment shader given; pass SHADER or set shader.fragment")?;

        let mut textures: Vec<(String, PathBuf)> = config.textures.into_iter().collect();
        for (key, path) in &cli.textures {
            match textures.iter_mut().find(|entry| entry.0 == *key) {
                Some(entry) => entry.1 = path.clone(),
                None => textures.push((key.clone(), path.clone())),
            }
        }

        let power = match config.render.power {
            PowerPreference::Low => GpuPowerPreference::Low,
            PowerPreference::High => GpuPowerPreference::High,
        };

        Ok(Self {
            fragment,
            vertex: cli.vertex.clone().or(config.shader.vertex),
            size: cli
                .size
                .unwrap_or((config.window.width, config.window.height)),
            title: config.window.title,
            textures,
            background: Color::from(config.render.background),
            power,
            vsync: config.render.vsync,
            start_paused: cli.paused || config.clock.start_paused,
            reload_interval: config.shader.reload_interval,
        })
    }

    /// Loads finish in any order, so the first configured key is bound
    /// explicitly rather than relying on cache insertion order.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            start_paused: self.start_paused,
            background: self.background,
            texture_binding: self
                .textures
                .first()
                .map(|(key, _)| TextureBinding::Key(key.clone()))
                .unwrap_or_default(),
        }
    }

    pub fn wgpu_options(&self) -> WgpuOptions {
        WgpuOptions {
            power: self.power,
            vsync: self.vsync,
        }
    }
}
