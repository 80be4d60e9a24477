use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use speechgate_core::JobDispatcher;

use crate::config::{absolutize, ServerConfig};

/// Per-request knobs of the synthesize handler.
#[derive(Clone, Debug)]
pub struct HandlerSettings {
    /// Absolute output directory
    pub output_dir: PathBuf,
    pub retention: Duration,
    pub deadline: Duration,
    pub max_text_chars: usize,
}

impl HandlerSettings {
    pub fn from_config(cfg: &ServerConfig) -> std::io::Result<Self> {
        Ok(Self {
            output_dir: absolutize(&cfg.output_dir)?,
            retention: cfg.retention(),
            deadline: cfg.deadline(),
            max_text_chars: cfg.max_text_chars,
        })
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
    pub settings: Arc<HandlerSettings>,
}

impl AppState {
    pub fn new(dispatcher: Arc<JobDispatcher>, settings: HandlerSettings) -> Self {
        Self {
            dispatcher,
            settings: Arc::new(settings),
        }
    }
}
