use std::sync::Arc;

pub mod ai;
pub mod config;
pub mod error;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod receipt;
pub mod routes;

use ai::AiExtractor;
use config::Config;
use ocr::{EngineFactory, RecognizerRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RecognizerRegistry>,
    pub ai: Arc<AiExtractor>,
}

impl AppState {
    /// The engine factory is injected so tests can run the pipeline against a
    /// fake recognizer.
    pub fn new(config: Config, factory: Arc<dyn EngineFactory>) -> anyhow::Result<Self> {
        let ai = AiExtractor::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(RecognizerRegistry::new(factory)),
            ai: Arc::new(ai),
        })
    }
}
