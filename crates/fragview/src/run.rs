use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use renderer::{
    FrameOutcome, PresentError, ShaderEngine, SkipReason, TextureLoad, WgpuBackend, WgpuTexture,
};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::settings::Settings;
use crate::watch::ShaderWatcher;

type Engine = ShaderEngine<WgpuBackend>;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(settings: Settings) -> Result<()> {
    let fragment = fs::read_to_string(&settings.fragment)
        .with_context(|| format!("failed to read fragment shader {}", settings.fragment.display()))?;
    let vertex = settings
        .vertex
        .as_ref()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("failed to read vertex shader {}", path.display()))
        })
        .transpose()?;

    let event_loop = EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(settings.title.as_str())
        .with_inner_size(PhysicalSize::new(settings.size.0, settings.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let inner = window.inner_size();

    let (backend, mut surface) = WgpuBackend::new(
        window.clone(),
        (inner.width, inner.height),
        settings.wgpu_options(),
    )?;
    tracing::info!(adapter = backend.adapter_name(), "gpu ready");

    let engine: Arc<Engine> = Arc::new(
        ShaderEngine::new(Arc::new(backend), settings.engine_options())
            .context("failed to initialise shader engine")?,
    );
    engine.on_compilation_error(|err| {
        let first_line = err.diagnostic.lines().next().unwrap_or_default();
        tracing::error!(reason = first_line, "shader rejected; previous pipeline stays bound");
    });

    // Vertex first so the fragment submission compiles the final program once.
    if vertex.is_some() {
        let _ = engine.set_vertex_source(vertex);
    }
    let _ = engine.set_fragment_source(fragment.clone());

    let mut pending: Vec<(String, TextureLoad<WgpuTexture>)> = settings
        .textures
        .iter()
        .map(|(key, path)| {
            tracing::debug!(key = %key, path = %path.display(), "loading texture");
            (key.clone(), engine.textures().load_from_path(path.clone(), key.clone()))
        })
        .collect();

    let watcher = {
        let engine = Arc::clone(&engine);
        ShaderWatcher::spawn(
            settings.fragment.clone(),
            settings.reload_interval,
            fragment,
            move |source| {
                let _ = engine.set_fragment_source(source);
            },
        )?
    };

    let run_result = event_loop.run(move |event, elwt| {
        // Owned by the loop so it stops when the window does.
        let _watcher = &watcher;
        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::KeyboardInput { event, .. } => {
                    if handle_key(&engine, &event) == KeyAction::Exit {
                        elwt.exit();
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    engine.set_pointer_position([position.x as f32, position.y as f32]);
                }
                WindowEvent::Resized(size) => {
                    surface.resize(engine.backend(), size.width, size.height);
                }
                WindowEvent::RedrawRequested => match engine.render(&mut surface) {
                    FrameOutcome::Drawn { .. } => {}
                    FrameOutcome::Skipped(SkipReason::Present(PresentError::OutOfMemory)) => {
                        tracing::error!("surface out of memory; exiting preview");
                        elwt.exit();
                    }
                    FrameOutcome::Skipped(reason) => {
                        tracing::trace!(?reason, "frame skipped");
                    }
                },
                _ => {}
            },
            Event::AboutToWait => {
                poll_texture_loads(&mut pending);
                window.request_redraw();
                elwt.set_control_flow(ControlFlow::Wait);
            }
            _ => {}
        }
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    None,
    Exit,
}

fn handle_key(engine: &Engine, event: &KeyEvent) -> KeyAction {
    if event.state != ElementState::Pressed || event.repeat {
        return KeyAction::None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => return KeyAction::Exit,
        Key::Named(NamedKey::Space) => engine.toggle(),
        Key::Character(value) if value.as_str() == " " => engine.toggle(),
        Key::Character(value) if value.eq_ignore_ascii_case("r") => {
            engine.reset();
            tracing::info!("clock reset");
        }
        _ => {}
    }
    KeyAction::None
}

fn poll_texture_loads(pending: &mut Vec<(String, TextureLoad<WgpuTexture>)>) {
    pending.retain_mut(|(key, load)| match load.try_take() {
        None => true,
        Some(Ok(texture)) => {
            let size = texture.size();
            tracing::info!(key = %key, width = size.0, height = size.1, "texture ready");
            false
        }
        Some(Err(err)) => {
            tracing::warn!(key = %key, error = %err, "texture load failed");
            false
        }
    });
}
