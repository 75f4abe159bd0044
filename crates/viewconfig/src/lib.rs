use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerPreference {
    Low,
    #[default]
    High,
}

/// Preview host settings, usually read from `fragview.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewConfig {
    pub version: u32,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub shader: ShaderConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    /// Texture cache key to image path. The first key, in name order, is
    /// what an unbound snippet samples.
    #[serde(default)]
    pub textures: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShaderConfig {
    #[serde(default)]
    pub fragment: Option<PathBuf>,
    #[serde(default)]
    pub vertex: Option<PathBuf>,
    #[serde(
        default = "default_reload_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub reload_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenderConfig {
    #[serde(default = "default_background")]
    pub background: [f64; 4],
    #[serde(default)]
    pub power: PowerPreference,
    #[serde(default = "default_vsync")]
    pub vsync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClockConfig {
    #[serde(default)]
    pub start_paused: bool,
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_title() -> String {
    "fragview".to_string()
}

fn default_reload_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_background() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_vsync() -> bool {
    true
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            window: WindowConfig::default(),
            shader: ShaderConfig::default(),
            render: RenderConfig::default(),
            clock: ClockConfig::default(),
            textures: BTreeMap::new(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            fragment: None,
            vertex: None,
            reload_interval: default_reload_interval(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
            power: PowerPreference::default(),
            vsync: default_vsync(),
        }
    }
}

impl ViewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: ViewConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates `path`. Relative shader and texture paths are
    /// resolved against the directory holding the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if let Some(component) = self
            .render
            .background
            .iter()
            .find(|component| !(0.0..=1.0).contains(*component))
        {
            return Err(ConfigError::Invalid(format!(
                "render.background components must be within [0, 1], got {component}"
            )));
        }
        if self.shader.reload_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "shader.reload_interval must be greater than zero".into(),
            ));
        }
        if self.textures.keys().any(|key| key.trim().is_empty()) {
            return Err(ConfigError::Invalid("texture keys must not be empty".into()));
        }
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(fragment) = self.shader.fragment.as_mut() {
            resolve(fragment);
        }
        if let Some(vertex) = self.shader.vertex.as_mut() {
            resolve(vertex);
        }
        self.textures.values_mut().for_each(resolve);
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a non-negative number of seconds"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[window]
width = 800
height = 600
title = "plasma"

[shader]
fragment = "plasma.wgsl"
vertex = "/abs/quad.wgsl"
reload_interval = "250ms"

[render]
background = [0.1, 0.2, 0.3, 1.0]
power = "low"
vsync = false

[clock]
start_paused = true

[textures]
noise = "textures/noise.png"
"#;

    #[test]
    fn parses_sample_config() {
        let config = ViewConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "plasma");
        assert_eq!(config.shader.fragment, Some(PathBuf::from("plasma.wgsl")));
        assert_eq!(config.shader.reload_interval, Duration::from_millis(250));
        assert_eq!(config.render.background, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.render.power, PowerPreference::Low);
        assert!(!config.render.vsync);
        assert!(config.clock.start_paused);
        assert_eq!(
            config.textures.get("noise"),
            Some(&PathBuf::from("textures/noise.png"))
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ViewConfig::from_toml_str("version = 1").expect("parse config");
        assert_eq!(config, ViewConfig::default());
        assert_eq!(config.shader.reload_interval, Duration::from_millis(500));
        assert!(config.render.vsync);
    }

    #[test]
    fn numeric_reload_interval_is_seconds() {
        let config = ViewConfig::from_toml_str("version = 1\n[shader]\nreload_interval = 2\n")
            .expect("parse config");
        assert_eq!(config.shader.reload_interval, Duration::from_secs(2));

        let config = ViewConfig::from_toml_str("version = 1\n[shader]\nreload_interval = 0.25\n")
            .expect("parse config");
        assert_eq!(config.shader.reload_interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = ViewConfig::from_toml_str("version = 2").expect_err("version 2");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("version 2")));
    }

    #[test]
    fn rejects_zero_window_size() {
        let err = ViewConfig::from_toml_str("version = 1\n[window]\nwidth = 0\n")
            .expect_err("zero width");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_background_out_of_range() {
        let err = ViewConfig::from_toml_str("version = 1\n[render]\nbackground = [0.0, 1.5, 0.0, 1.0]\n")
            .expect_err("component above one");
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("1.5")));
    }

    #[test]
    fn rejects_zero_reload_interval() {
        let err = ViewConfig::from_toml_str("version = 1\n[shader]\nreload_interval = \"0s\"\n")
            .expect_err("zero interval");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = ViewConfig::from_toml_str("version = 1\n[shader]\nreload_interval = \"soon\"\n")
            .expect_err("bad duration");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_empty_texture_key() {
        let err = ViewConfig::from_toml_str("version = 1\n[textures]\n\"\" = \"a.png\"\n")
            .expect_err("empty key");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_resolves_paths_next_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fragview.toml");
        fs::write(&path, SAMPLE).expect("write config");

        let config = ViewConfig::load(&path).expect("load config");
        assert_eq!(config.shader.fragment, Some(dir.path().join("plasma.wgsl")));
        assert_eq!(config.shader.vertex, Some(PathBuf::from("/abs/quad.wgsl")));
        assert_eq!(
            config.textures.get("noise"),
            Some(&dir.path().join("textures/noise.png"))
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");
        match ViewConfig::load(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
