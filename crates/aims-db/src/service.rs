//! Service layer orchestrating the store, the resolver, and the trail.
//!
//! `AimsService` wraps `AimsDb` (raw database access), `TrailWriter` (JSONL
//! persistence), and the injected similarity and rate strategies. All repo
//! methods are implemented as `impl AimsService` blocks.

use std::path::PathBuf;

use aims_config::{AimsConfig, SimilarityKind, StrategyConfig};
use aims_core::rates::{NoRates, RateProvider};
use aims_core::resolution::ResolverSettings;
use aims_core::similarity::{LevenshteinSimilarity, Similarity, TrigramSimilarity};
use aims_ingest::ValidationRules;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::AimsDb;
use crate::error::DatabaseError;
use crate::trail::writer::TrailWriter;

/// Default cap on skipped/failed entries stored with a committed session.
const DEFAULT_ERROR_LOG_LIMIT: usize = 100;

/// Entry point for the import workflow and the entity store.
///
/// The connection is shared. Every mutating method holds the write lock for
/// its whole duration and every read holds the read lock, so no statement
/// lands inside (or observes) an open commit transaction, and identifier
/// claims are serialized.
pub struct AimsService {
    db: AimsDb,
    trail: TrailWriter,
    similarity: Box<dyn Similarity>,
    rates: Box<dyn RateProvider>,
    resolver: ResolverSettings,
    rules: ValidationRules,
    strategies: StrategyConfig,
    error_log_limit: usize,
    lock: RwLock<()>,
}

impl AimsService {
    /// Create a new service wrapping a local database with default settings.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    /// * `trail_dir` - Directory for JSONL trail files. `None` disables the trail.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or the trail
    /// directory cannot be created.
    pub async fn new_local(
        db_path: &str,
        trail_dir: Option<PathBuf>,
    ) -> Result<Self, DatabaseError> {
        let db = AimsDb::open_local(db_path).await?;
        let trail = match trail_dir {
            Some(dir) => TrailWriter::new(dir)?,
            None => TrailWriter::disabled(),
        };
        Ok(Self::from_db(db, trail))
    }

    /// Create a service from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or the trail
    /// directory cannot be created.
    pub async fn from_config(config: &AimsConfig) -> Result<Self, DatabaseError> {
        let trail_dir = config
            .general
            .trail_enabled()
            .then(|| PathBuf::from(config.general.trail_dir.trim()));
        let service = Self::new_local(&config.database.path, trail_dir).await?;

        let similarity: Box<dyn Similarity> = match config.resolver.similarity {
            SimilarityKind::Trigram => Box::new(TrigramSimilarity),
            SimilarityKind::Levenshtein => Box::new(LevenshteinSimilarity),
        };
        Ok(service
            .with_similarity(similarity)
            .with_resolver_settings(config.resolver.settings())
            .with_validation_rules(ValidationRules {
                percentage_tolerance: config.validation.percentage_tolerance,
                max_period_days: config.validation.max_period_days,
            })
            .with_strategies(config.import.strategies)
            .with_error_log_limit(config.general.error_log_limit))
    }

    /// Create from an existing `AimsDb` with default settings (for testing).
    #[must_use]
    pub fn from_db(db: AimsDb, trail: TrailWriter) -> Self {
        Self {
            db,
            trail,
            similarity: Box::new(TrigramSimilarity),
            rates: Box::new(NoRates),
            resolver: ResolverSettings::default(),
            rules: ValidationRules::default(),
            strategies: StrategyConfig::default(),
            error_log_limit: DEFAULT_ERROR_LOG_LIMIT,
            lock: RwLock::new(()),
        }
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    #[must_use]
    pub fn with_rates(mut self, rates: Box<dyn RateProvider>) -> Self {
        self.rates = rates;
        self
    }

    #[must_use]
    pub const fn with_resolver_settings(mut self, settings: ResolverSettings) -> Self {
        self.resolver = settings;
        self
    }

    #[must_use]
    pub const fn with_validation_rules(mut self, rules: ValidationRules) -> Self {
        self.rules = rules;
        self
    }

    #[must_use]
    pub const fn with_strategies(mut self, strategies: StrategyConfig) -> Self {
        self.strategies = strategies;
        self
    }

    #[must_use]
    pub const fn with_error_log_limit(mut self, limit: usize) -> Self {
        self.error_log_limit = limit;
        self
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &AimsDb {
        &self.db
    }

    /// Access the trail writer.
    #[must_use]
    pub const fn trail(&self) -> &TrailWriter {
        &self.trail
    }

    #[must_use]
    pub fn similarity(&self) -> &dyn Similarity {
        self.similarity.as_ref()
    }

    #[must_use]
    pub fn rates(&self) -> &dyn RateProvider {
        self.rates.as_ref()
    }

    #[must_use]
    pub const fn resolver_settings(&self) -> ResolverSettings {
        self.resolver
    }

    #[must_use]
    pub const fn validation_rules(&self) -> &ValidationRules {
        &self.rules
    }

    #[must_use]
    pub const fn strategies(&self) -> &StrategyConfig {
        &self.strategies
    }

    #[must_use]
    pub const fn error_log_limit(&self) -> usize {
        self.error_log_limit
    }

    /// Exclusive access. Held across the whole of a mutating call.
    pub(crate) async fn write_lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().await
    }

    /// Shared access for reads. Never taken while already holding either guard.
    pub(crate) async fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }
}
