use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use renderer::{compose_program, validate_program, ComposedProgram, SourceShape, UniformStore};
use serde::Serialize;

use crate::settings::Settings;

/// Outcome of composing and validating one fragment source without a GPU.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub fragment: String,
    pub shape: SourceShape,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

pub fn compose_files(fragment: &Path, vertex: Option<&Path>) -> Result<ComposedProgram> {
    let fragment_source = fs::read_to_string(fragment)
        .with_context(|| format!("failed to read fragment shader {}", fragment.display()))?;
    let vertex_source = vertex
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read vertex shader {}", path.display()))
        })
        .transpose()?;
    Ok(compose_program(
        &fragment_source,
        vertex_source.as_deref(),
        &UniformStore::with_builtins().declarations(),
    ))
}

pub fn check(settings: &Settings) -> Result<CheckReport> {
    let program = compose_files(&settings.fragment, settings.vertex.as_deref())?;
    let diagnostic = validate_program(&program).err().map(|err| err.diagnostic);
    Ok(CheckReport {
        fragment: settings.fragment.display().to_string(),
        shape: program.shape(),
        valid: diagnostic.is_none(),
        diagnostic,
    })
}

pub fn run_check(settings: &Settings, json: bool) -> Result<ExitCode> {
    let report = check(settings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} program", report.fragment, report.shape);
        match &report.diagnostic {
            Some(diagnostic) => eprintln!("{diagnostic}"),
            None => println!("ok"),
        }
    }
    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub fn run_print_composed(settings: &Settings) -> Result<ExitCode> {
    let program = compose_files(&settings.fragment, settings.vertex.as_deref())?;
    print!("{}", program.source());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use renderer::{Color, GpuPowerPreference};

    use super::*;

    fn settings_for(fragment: &Path) -> Settings {
        Settings {
            fragment: fragment.to_path_buf(),
            vertex: None,
            size: (64, 64),
            title: "test".into(),
            textures: Vec::new(),
            background: Color::BLACK,
            power: GpuPowerPreference::Low,
            vsync: true,
            start_paused: false,
            reload_interval: Duration::from_millis(500),
        }
    }

    #[test]
    fn valid_snippet_reports_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("red.wgsl");
        fs::write(&path, "return vec4<f32>(1.0, 0.0, 0.0, 1.0);").expect("write");

        let report = check(&settings_for(&path)).expect("check");
        assert!(report.valid);
        assert_eq!(report.shape, SourceShape::Snippet);
        assert!(report.diagnostic.is_none());
    }

    #[test]
    fn invalid_snippet_carries_diagnostic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.wgsl");
        fs::write(&path, "return vec4<f32>(1.0, 0.0;").expect("write");

        let report = check(&settings_for(&path)).expect("check");
        assert!(!report.valid);
        assert!(report.diagnostic.is_some());

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["shape"], "snippet");
        assert_eq!(json["valid"], false);
    }

    #[test]
    fn missing_vertex_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("red.wgsl");
        fs::write(&path, "return vec4<f32>(1.0);").expect("write");
        let mut settings = settings_for(&path);
        settings.vertex = Some(dir.path().join("absent.wgsl"));
        assert!(check(&settings).is_err());
    }
}
