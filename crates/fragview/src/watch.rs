use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

/// Polls a shader file and hands new contents to a callback.
///
/// Dropping the watcher stops the thread and waits for it.
pub struct ShaderWatcher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ShaderWatcher {
    /// `initial` is the text already submitted, so the first poll does not
    /// report it again.
    pub fn spawn<F>(path: PathBuf, interval: Duration, initial: String, mut on_change: F) -> Result<Self>
    where
        F: FnMut(String) + Send + 'static,
    {
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("shader-watch".into())
            .spawn(move || {
                let mut last = initial;
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    match fs::read_to_string(&path) {
                        Ok(contents) if contents != last => {
                            tracing::info!(path = %path.display(), "shader changed; reloading");
                            last = contents.clone();
                            on_change(contents);
                        }
                        Ok(_) => {}
                        // Editors often replace files by rename; try again next tick.
                        Err(err) => {
                            tracing::debug!(path = %path.display(), error = %err, "shader unreadable");
                        }
                    }
                }
            })
            .context("failed to spawn shader watcher")?;

        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }
}

impl Drop for ShaderWatcher {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("shader watcher thread panicked");
            }
        }
    }
}
