//! Collaborators the engine calls into: component parser, language
//! compilers, plugins, package manifests, the result store and the output
//! writer. A [`Toolchain`] bundles one of each.

pub mod compiler;
pub mod parser;
pub mod plugin;
pub mod writer;

pub use compiler::{
    CommandCompiler, CompileOutput, CompileRequest, CompilerRegistry, LanguageCompiler,
    Passthrough,
};
pub use parser::{ComponentParser, ComponentSections, Section, SectionSource, SfcParser};
pub use plugin::{
    BannerPlugin, OutputKind, Plugin, PluginCatalog, PluginChain, PluginFactory, PluginInput,
    PluginOutput, ReplacePlugin,
};
pub use writer::{FsWriter, MemoryWriter, OutputWriter};

use std::sync::Arc;

use crate::cache::{ContentStore, DiskStore};
use crate::error::BuildResult;
use crate::params::BuildParams;
use crate::resolver::{FsManifestReader, ManifestReader};

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub parser: Arc<dyn ComponentParser>,
    pub compilers: Arc<CompilerRegistry>,
    pub plugins: Arc<PluginChain>,
    pub manifests: Arc<dyn ManifestReader>,
    pub store: Arc<dyn ContentStore>,
    pub writer: Arc<dyn OutputWriter>,
}

impl Toolchain {
    /// Default wiring: files on disk, compilers and plugins from configuration.
    pub fn from_params(params: &BuildParams) -> BuildResult<Self> {
        Ok(Self {
            parser: Arc::new(SfcParser),
            compilers: Arc::new(CompilerRegistry::from_config(&params.config)?),
            plugins: Arc::new(PluginChain::from_config(
                &params.config.plugins,
                &PluginCatalog::builtin(),
            )?),
            manifests: Arc::new(FsManifestReader::new()),
            store: Arc::new(DiskStore::open(params.content_store_dir())),
            writer: Arc::new(FsWriter),
        })
    }

    pub fn with_compilers(mut self, compilers: CompilerRegistry) -> Self {
        self.compilers = Arc::new(compilers);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn ComponentParser>) -> Self {
        self.parser = parser;
        self
    }
}

/// Builds a toolchain inside each worker from the shared build parameters.
pub type ToolchainFactory = Arc<dyn Fn(&BuildParams) -> BuildResult<Toolchain> + Send + Sync>;

pub fn default_factory() -> ToolchainFactory {
    Arc::new(Toolchain::from_params)
}
