//! One reasoning session: the stateful parts a controller works on.

use crate::chain::{ChainAdapter, ChainConfig};
use crate::config::SessionConfig;
use crate::error::PlnResult;
use crate::exemplar::{DurableExemplars, ExemplarStore, MemoryExemplars};
use crate::oracle::RelationOracle;
use crate::paths::SessionPaths;
use crate::resolver::{ResolverConfig, TypeResolver};
use crate::store::{KnowledgeStore, LoadReport};

/// Knowledge store (inside its chaining adapter), type resolver and
/// exemplar storage of one session.
pub struct Session {
    pub adapter: ChainAdapter,
    pub resolver: TypeResolver,
    pub exemplars: Box<dyn ExemplarStore>,
}

impl Session {
    /// Assemble a session. The resolver is seeded with the store's type declarations.
    pub fn new(
        adapter: ChainAdapter,
        mut resolver: TypeResolver,
        exemplars: Box<dyn ExemplarStore>,
    ) -> PlnResult<Self> {
        resolver.seed(adapter.store())?;
        Ok(Self {
            adapter,
            resolver,
            exemplars,
        })
    }

    /// A session with no files behind it.
    pub fn in_memory(
        store: KnowledgeStore,
        chaining: ChainConfig,
        resolver: ResolverConfig,
        relations: Box<dyn RelationOracle>,
    ) -> PlnResult<Self> {
        Self::new(
            ChainAdapter::local(store, chaining)?,
            TypeResolver::new(resolver, relations),
            Box::new(MemoryExemplars::new()),
        )
    }

    /// Open the files of `paths` (or the overrides in `config`).
    ///
    /// The knowledge file is loaded through conflict-checked admission; the
    /// returned report lists conflicting and unparsable lines, which are
    /// skipped rather than fatal.
    pub fn open(
        config: &SessionConfig,
        paths: &SessionPaths,
        relations: Box<dyn RelationOracle>,
    ) -> PlnResult<(Self, LoadReport)> {
        paths.ensure_dirs()?;
        let knowledge_file = config.knowledge.knowledge_file(paths);
        let (store, report) = KnowledgeStore::load(&knowledge_file, config.knowledge.read_only)?;
        for (line, conflict) in &report.conflicts {
            tracing::warn!(file = %knowledge_file.display(), line, %conflict, "conflicting line skipped");
        }
        for (line, error) in &report.parse_errors {
            tracing::warn!(file = %knowledge_file.display(), line, %error, "unparsable line skipped");
        }
        for (line, statement) in &report.refused {
            tracing::warn!(file = %knowledge_file.display(), line, %statement, "variable witness skipped");
        }

        let exemplars = DurableExemplars::open(&config.knowledge.exemplar_db(paths))?;
        let session = Self::new(
            ChainAdapter::local(store, config.chaining.clone())?,
            TypeResolver::new(config.resolver.clone(), relations),
            Box::new(exemplars),
        )?;
        tracing::info!(
            session = %paths.name,
            statements = session.adapter.store().len(),
            types = session.resolver.known_types(),
            exemplars = session.exemplars.len(),
            "session opened"
        );
        Ok((session, report))
    }

    pub fn store(&self) -> &KnowledgeStore {
        self.adapter.store()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("adapter", &self.adapter)
            .field("resolver", &self.resolver)
            .field("exemplars", &self.exemplars.len())
            .finish()
    }
}
