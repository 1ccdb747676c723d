//! Typed repositories over the shared connection pool.

pub mod combo_repo;
pub mod confidence_repo;
pub mod fact_check_repo;
pub mod live_signal_repo;
pub mod signal_definition_repo;

pub use combo_repo::ComboRepository;
pub use confidence_repo::ConfidenceRepository;
pub use fact_check_repo::FactCheckRepository;
pub use live_signal_repo::LiveSignalRepository;
pub use signal_definition_repo::SignalDefinitionRepository;

use sqlx::PgPool;

/// Bundle of every repository, cloned cheaply around the pipeline.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub live_signals: LiveSignalRepository,
    pub fact_checks: FactCheckRepository,
    pub confidence: ConfidenceRepository,
    pub combos: ComboRepository,
    pub definitions: SignalDefinitionRepository,
}

impl Repositories {
    /// Creates all repositories over one pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            live_signals: LiveSignalRepository::new(pool.clone()),
            fact_checks: FactCheckRepository::new(pool.clone()),
            confidence: ConfidenceRepository::new(pool.clone()),
            combos: ComboRepository::new(pool.clone()),
            definitions: SignalDefinitionRepository::new(pool),
        }
    }
}
