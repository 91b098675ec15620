use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::level_filters::LevelFilter;
use tracing_flame::{FlameLayer, FlushGuard};
use tracing_subscriber::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("failed to create log file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set up flame graph output: {0}")]
    Flame(#[from] tracing_flame::Error),
    #[error("a global subscriber is already installed: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Logging setup for applications embedding the router. Nothing is
/// installed until [`LibTracer::install`] is called.
#[derive(Clone, Debug)]
pub struct LibTracer {
    stdout_level: LevelFilter,
    debug_log: Option<PathBuf>,
    flame_graph: Option<PathBuf>,
}

/// Keeps the flame graph writer alive; folded stacks are flushed on drop.
pub struct TracingGuard {
    _flame: Option<FlushGuard<BufWriter<File>>>,
}

impl Default for LibTracer {
    fn default() -> Self {
        LibTracer {
            stdout_level: LevelFilter::INFO,
            debug_log: None,
            flame_graph: None,
        }
    }
}

impl LibTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout_level(mut self, level: LevelFilter) -> Self {
        self.stdout_level = level;
        self
    }

    /// Also write every event, at all levels, to a plain text file.
    pub fn with_debug_log(mut self, path: impl AsRef<Path>) -> Self {
        self.debug_log = Some(path.as_ref().to_path_buf());
        self
    }

    /// Record spans as folded stacks for `inferno` style flame graphs.
    pub fn with_flame_graph(mut self, path: impl AsRef<Path>) -> Self {
        self.flame_graph = Some(path.as_ref().to_path_buf());
        self
    }

    fn build(self) -> Result<(impl tracing::Subscriber + Send + Sync + 'static, TracingGuard), TracingError> {
        let stdout_log = tracing_subscriber::fmt::layer()
            .pretty()
            .with_filter(self.stdout_level);

        let debug_log = match &self.debug_log {
            Some(path) => {
                let file = File::create(path).map_err(|source| TracingError::Io {
                    path: path.clone(),
                    source,
                })?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
            }
            None => None,
        };

        let (flame_layer, flame_guard) = match &self.flame_graph {
            Some(path) => {
                let (layer, guard) = FlameLayer::with_file(path)?;
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let subscriber = tracing_subscriber::registry()
            .with(stdout_log)
            .with(debug_log)
            .with(flame_layer);
        Ok((subscriber, TracingGuard { _flame: flame_guard }))
    }

    /// Install as the process-wide subscriber. Keep the returned guard for
    /// as long as events should be recorded.
    pub fn install(self) -> Result<TracingGuard, TracingError> {
        let (subscriber, guard) = self.build()?;
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(guard)
    }
}
