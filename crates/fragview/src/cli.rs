use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "fragview",
    author,
    version,
    about = "Live preview for WGSL fragment snippets"
)]
pub struct Cli {
    /// Fragment source: a statement snippet or a full WGSL module.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// TOML configuration file (`fragview.toml`).
    #[arg(long, value_name = "FILE", env = "FRAGVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Custom vertex stage replacing the built-in full-screen quad.
    #[arg(long, value_name = "FILE")]
    pub vertex: Option<PathBuf>,

    /// Window size in pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Load an image into the texture cache; repeatable. The first key is
    /// the one bound to `u_texture`.
    #[arg(long = "texture", value_name = "KEY=PATH", value_parser = parse_texture)]
    pub textures: Vec<(String, PathBuf)>,

    /// Start with the shader clock paused.
    #[arg(long)]
    pub paused: bool,

    /// Compose and validate without opening a window; exits non-zero on error.
    #[arg(long)]
    pub check: bool,

    /// Print the composed WGSL program and exit.
    #[arg(long)]
    pub print_composed: bool,

    /// Emit the `--check` report as JSON.
    #[arg(long, requires = "check")]
    pub json: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(|ch: char| ch == 'x' || ch == 'X')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width `{width}`: {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height `{height}`: {err}"))?;
    if width == 0 || height == 0 {
        return Err(format!("size must be non-zero, got {width}x{height}"));
    }
    Ok((width, height))
}

pub fn parse_texture(value: &str) -> Result<(String, PathBuf), String> {
    let (key, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=PATH, got `{value}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("texture key must not be empty".into());
    }
    if path.is_empty() {
        return Err(format!("texture `{key}` is missing a path"));
    }
    Ok((key.to_string(), PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("64X32"), Ok((64, 32)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("widexhigh").is_err());
    }

    #[test]
    fn parses_texture_pairs() {
        assert_eq!(
            parse_texture("noise=assets/noise.png"),
            Ok(("noise".to_string(), PathBuf::from("assets/noise.png")))
        );
        assert!(parse_texture("noise").is_err());
        assert!(parse_texture("=a.png").is_err());
        assert!(parse_texture("noise=").is_err());
    }

    #[test]
    fn flags_parse_together() {
        let cli = Cli::try_parse_from([
            "fragview",
            "demo.wgsl",
            "--size",
            "320x200",
            "--texture",
            "a=a.png",
            "--texture",
            "b=b.png",
            "--check",
            "--json",
        ])
        .expect("parse");
        assert_eq!(cli.shader, Some(PathBuf::from("demo.wgsl")));
        assert_eq!(cli.size, Some((320, 200)));
        assert_eq!(cli.textures.len(), 2);
        assert!(cli.check && cli.json);
    }

    #[test]
    fn json_requires_check() {
        assert!(Cli::try_parse_from(["fragview", "demo.wgsl", "--json"]).is_err());
    }
}
