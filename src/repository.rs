use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;

use crate::{
    domain::RuleId,
    dsl::{registry::NodeRegistry, semantic::SemanticType},
    error::{AugurResult, RepositoryError},
    rule::{Rule, RuleRecord, RuleStatus},
};

// ================================================================================================
// Repository Interface
// ================================================================================================

/// Abstracted rule storage.
///
/// The engine only reads; `put` exists for the evolutionary producer and
/// seed loaders. Implementations are free to back this with a document
/// column, a file, or memory; the serialized tree is opaque to them.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_by(
        &self,
        purpose: SemanticType,
        status: RuleStatus,
    ) -> AugurResult<Vec<RuleRecord>>;

    async fn get(&self, rule_id: &RuleId) -> AugurResult<RuleRecord>;

    async fn put(&self, record: RuleRecord) -> AugurResult<()>;
}

// ================================================================================================
// In-Memory Repository
// ================================================================================================

/// Repository backed by process memory. The staging store for seeds,
/// tests, and freshly evolved rules before they are persisted elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    records: RwLock<BTreeMap<RuleId, RuleRecord>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for seeding.
    pub fn with_records(records: impl IntoIterator<Item = RuleRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.rule_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    fn read(&self) -> AugurResult<std::sync::RwLockReadGuard<'_, BTreeMap<RuleId, RuleRecord>>> {
        self.records
            .read()
            .map_err(|_| RepositoryError::Unavailable("records lock poisoned".to_string()).into())
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_by(
        &self,
        purpose: SemanticType,
        status: RuleStatus,
    ) -> AugurResult<Vec<RuleRecord>> {
        let records = self.read()?;
        Ok(records
            .values()
            .filter(|record| record.purpose == purpose && record.rule_status == status)
            .cloned()
            .collect())
    }

    async fn get(&self, rule_id: &RuleId) -> AugurResult<RuleRecord> {
        let records = self.read()?;
        records
            .get(rule_id)
            .cloned()
            .ok_or_else(|| RepositoryError::RuleNotFound(rule_id.to_string()).into())
    }

    async fn put(&self, record: RuleRecord) -> AugurResult<()> {
        let mut records = self.records.write().map_err(|_| {
            crate::error::AugurError::from(RepositoryError::Unavailable(
                "records lock poisoned".to_string(),
            ))
        })?;
        records.insert(record.rule_id.clone(), record);
        Ok(())
    }
}

// ================================================================================================
// Rule Loader
// ================================================================================================

/// Turns records into parsed [`Rule`]s, caching by `(rule_id, version)`.
///
/// The cache is immutable per key (a rule change always carries a new
/// version), so a hit can never observe a stale tree.
#[derive(Debug)]
pub struct RuleLoader {
    registry: Arc<NodeRegistry>,
    cache: RwLock<HashMap<(RuleId, String), Arc<Rule>>>,
}

impl RuleLoader {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Loads a record, reusing the parsed tree when this exact
    /// `(rule_id, version)` was seen before.
    pub fn load(&self, record: &RuleRecord) -> AugurResult<Arc<Rule>> {
        let key = (record.rule_id.clone(), record.version.clone());

        if let Ok(cache) = self.cache.read()
            && let Some(rule) = cache.get(&key)
        {
            return Ok(rule.clone());
        }

        let rule = Arc::new(Rule::from_record(&self.registry, record)?);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, rule.clone());
        }
        Ok(rule)
    }
}
