//! Item processors: what a processor thread does with each work item.

pub mod echo;
pub mod hash;
pub mod store;
pub mod writer;

use std::sync::Arc;

use crate::error::CometError;
use crate::generator::GeneratorChain;
use crate::types::WorkItem;
use crate::utils::settings::{CometConfig, ProcessorKind};

pub use echo::EchoProcessor;
pub use store::{Auth, HttpStore, Payload, RemoteStore, StoreResponse};
pub use writer::{Capabilities, ObjectState, StoreWriter, probe_capabilities};

pub enum ItemProcessor {
    Echo(EchoProcessor),
    Remote(StoreWriter),
}

impl ItemProcessor {
    /// Build and initialize one processor. The remote writer probes the first destination's version.
    pub fn build(config: &CometConfig, store: Arc<dyn RemoteStore>) -> Result<Self, CometError> {
        match config.processor.kind {
            ProcessorKind::Echo => Ok(ItemProcessor::Echo(EchoProcessor)),
            ProcessorKind::Remote => {
                let generators = GeneratorChain::build(&config.generator)?;
                let dest = config.generator.destinations.first().ok_or_else(|| {
                    CometError::Config("remote processor has no destinations".to_string())
                })?;
                let root = url::Url::parse(&dest.root_path)?;
                let caps = probe_capabilities(store.as_ref(), &root, &dest.credentials())?;
                Ok(ItemProcessor::Remote(StoreWriter::new(
                    store,
                    generators,
                    caps,
                    config.processor.validate_hash,
                )))
            }
        }
    }

    pub fn process(&self, item: &mut WorkItem) -> Result<(), CometError> {
        match self {
            ItemProcessor::Echo(p) => p.process(item),
            ItemProcessor::Remote(w) => w.process(item),
        }
    }
}
