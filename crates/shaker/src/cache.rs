//! Two-tier bounded store for derived identification features.
//!
//! Every [`Category`] owns a concurrent map from match key to value and a
//! population mutex. Categories are either "large" (per-residue arrays,
//! rendered strings) or "small" (scalars); each tier has its own bound,
//! enforced across all categories of the tier by clearing whole categories.
//!
//! # Invariants
//! * a (category, key) entry is written at most once until it is removed:
//!   population happens under the category mutex, and the first writer wins
//! * a category map is only cleared while its mutex is held, so a reader
//!   sees either the full map or a miss, never a partially cleared map
//! * a read-only cache never stores anything

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use serde::{Deserialize, Serialize};

use crate::features::SequenceCoverage;
use crate::validation::ValidationLevel;
use crate::{Error, Key, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    // Large objects
    CoverableAa,
    AaCoverage,
    AaCoverageEnzymatic,
    AaCoverageNonEnzymatic,
    ConfidentSites,
    AmbiguousSites,
    // Small objects, protein keys
    SequenceCoverage,
    ObservableCoverage,
    ObservableLength,
    MolecularWeight,
    HasNonEnzymatic,
    SpectrumCounting,
    NSpectra,
    NValidatedSpectra,
    NConfidentSpectra,
    NValidatedPeptides,
    NConfidentPeptides,
    NUniquePeptides,
    NUniqueValidatedPeptides,
    NConfidentSites,
    NAmbiguousSites,
    // Small objects, peptide keys
    PeptideNValidatedSpectra,
    PeptideNConfidentSpectra,
    PeptideNValidatedProteinGroups,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Large,
    Small,
}

impl Category {
    pub const ALL: [Category; 24] = [
        Category::CoverableAa,
        Category::AaCoverage,
        Category::AaCoverageEnzymatic,
        Category::AaCoverageNonEnzymatic,
        Category::ConfidentSites,
        Category::AmbiguousSites,
        Category::SequenceCoverage,
        Category::ObservableCoverage,
        Category::ObservableLength,
        Category::MolecularWeight,
        Category::HasNonEnzymatic,
        Category::SpectrumCounting,
        Category::NSpectra,
        Category::NValidatedSpectra,
        Category::NConfidentSpectra,
        Category::NValidatedPeptides,
        Category::NConfidentPeptides,
        Category::NUniquePeptides,
        Category::NUniqueValidatedPeptides,
        Category::NConfidentSites,
        Category::NAmbiguousSites,
        Category::PeptideNValidatedSpectra,
        Category::PeptideNConfidentSpectra,
        Category::PeptideNValidatedProteinGroups,
    ];

    pub fn tier(&self) -> Tier {
        match self {
            Category::CoverableAa
            | Category::AaCoverage
            | Category::AaCoverageEnzymatic
            | Category::AaCoverageNonEnzymatic
            | Category::ConfidentSites
            | Category::AmbiguousSites => Tier::Large,
            _ => Tier::Small,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Categories read, for the same key, by the estimate of this category
    pub fn inputs(&self) -> &'static [Category] {
        match self {
            Category::SequenceCoverage => &[Category::AaCoverage],
            Category::ObservableCoverage => &[Category::CoverableAa],
            Category::SpectrumCounting => &[Category::ObservableLength],
            _ => &[],
        }
    }

    /// Peptide level categories read, for every peptide of the protein, by
    /// the estimate of this category
    pub fn peptide_inputs(&self) -> &'static [Category] {
        match self {
            Category::NValidatedSpectra => &[Category::PeptideNValidatedSpectra],
            Category::NConfidentSpectra => &[Category::PeptideNConfidentSpectra],
            _ => &[],
        }
    }

    /// Values that change when match validation levels change
    pub fn depends_on_validation(&self) -> bool {
        matches!(
            self,
            Category::AaCoverage
                | Category::AaCoverageEnzymatic
                | Category::AaCoverageNonEnzymatic
                | Category::SequenceCoverage
                | Category::SpectrumCounting
                | Category::NValidatedSpectra
                | Category::NConfidentSpectra
                | Category::NValidatedPeptides
                | Category::NConfidentPeptides
                | Category::NUniqueValidatedPeptides
                | Category::PeptideNValidatedSpectra
                | Category::PeptideNConfidentSpectra
                | Category::PeptideNValidatedProteinGroups
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Count(usize),
    Number(f64),
    Flag(bool),
    Probabilities(Arc<Vec<f64>>),
    Levels(Arc<Vec<ValidationLevel>>),
    Coverage(SequenceCoverage),
    Text(Arc<str>),
}

impl CachedValue {
    pub fn as_count(&self) -> Option<usize> {
        match self {
            CachedValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CachedValue::Number(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            CachedValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_probabilities(&self) -> Option<Arc<Vec<f64>>> {
        match self {
            CachedValue::Probabilities(p) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn as_levels(&self) -> Option<Arc<Vec<ValidationLevel>>> {
        match self {
            CachedValue::Levels(l) => Some(l.clone()),
            _ => None,
        }
    }

    pub fn as_coverage(&self) -> Option<SequenceCoverage> {
        match self {
            CachedValue::Coverage(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<Arc<str>> {
        match self {
            CachedValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBounds {
    /// Maximal number of entries across all large categories
    pub large: usize,
    /// Maximal number of entries across all small categories
    pub small: usize,
}

impl Default for CacheBounds {
    fn default() -> Self {
        Self {
            large: 1_000,
            small: 1_000_000,
        }
    }
}

impl CacheBounds {
    fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::Large => self.large,
            Tier::Small => self.small,
        }
    }
}

/// Memoizes a single value, valid only for the key it was computed for
#[derive(Clone, Debug, PartialEq)]
pub struct SingleSlot<K, V> {
    key: Option<K>,
    value: Option<V>,
}

impl<K, V> Default for SingleSlot<K, V> {
    fn default() -> Self {
        Self {
            key: None,
            value: None,
        }
    }
}

impl<K: PartialEq, V> SingleSlot<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        match &self.key {
            Some(k) if k == key => self.value.as_ref(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: K, value: V) {
        self.key = Some(key);
        self.value = Some(value);
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn clear(&mut self) {
        self.key = None;
        self.value = None;
    }
}

/// PSMs of a peptide, in display order
#[derive(Clone, Debug, PartialEq)]
pub struct PsmList {
    pub keys: Arc<Vec<Key>>,
    pub n_validated: usize,
}

/// Protein lists produced by the ordering pass and the hide pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProteinOrdering {
    /// All proteins, sorted
    pub processed: Option<Arc<Vec<Key>>>,
    /// Proteins left after applying the hide-filters
    pub displayed: Option<Arc<Vec<Key>>>,
    /// Displayed proteins that are validated
    pub validated: Option<Arc<Vec<Key>>>,
    /// A hide-filter changed since the last hide pass
    pub filtered: bool,
}

#[derive(Debug, Default)]
struct CategoryStore {
    lock: Mutex<()>,
    entries: DashMap<Key, CachedValue, FnvBuildHasher>,
}

#[derive(Debug, Default)]
struct Selection {
    peptides: Mutex<SingleSlot<Key, Arc<Vec<Key>>>>,
    psms: Mutex<SingleSlot<Key, PsmList>>,
    proteins: Mutex<ProteinOrdering>,
}

#[derive(Debug)]
pub struct FeaturesCache {
    bounds: CacheBounds,
    stores: Vec<CategoryStore>,
    large_count: AtomicUsize,
    small_count: AtomicUsize,
    read_only: AtomicBool,
    selection: Selection,
}

impl Default for FeaturesCache {
    fn default() -> Self {
        Self::new(CacheBounds::default())
    }
}

impl FeaturesCache {
    pub fn new(bounds: CacheBounds) -> Self {
        Self {
            bounds,
            stores: Category::ALL.iter().map(|_| CategoryStore::default()).collect(),
            large_count: AtomicUsize::new(0),
            small_count: AtomicUsize::new(0),
            read_only: AtomicBool::new(false),
            selection: Selection::default(),
        }
    }

    fn store(&self, category: Category) -> &CategoryStore {
        &self.stores[category.index()]
    }

    fn counter(&self, tier: Tier) -> &AtomicUsize {
        match tier {
            Tier::Large => &self.large_count,
            Tier::Small => &self.small_count,
        }
    }

    pub fn bounds(&self) -> CacheBounds {
        self.bounds
    }

    /// Number of entries currently stored in a tier
    pub fn len(&self, tier: Tier) -> usize {
        self.counter(tier).load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len(Tier::Large) == 0 && self.len(Tier::Small) == 0
    }

    pub fn category_len(&self, category: Category) -> usize {
        self.store(category).entries.len()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Release);
    }

    /// Lock-free with respect to population: may miss an entry that is
    /// concurrently being written or evicted
    pub fn get(&self, category: Category, key: Key) -> Option<CachedValue> {
        self.store(category)
            .entries
            .get(&key)
            .map(|entry| entry.value().clone())
    }

    /// Store a value unless one is already present. No-op when read-only
    pub fn put(&self, category: Category, key: Key, value: CachedValue) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        let inserted = {
            let _guard = self.lock(category)?;
            self.insert_locked(category, key, value)
        };
        if inserted {
            self.enforce_bound(category)?;
        }
        Ok(())
    }

    /// Return the cached value, or compute it with `estimate` and store it.
    ///
    /// `estimate` runs while the category mutex is held, so concurrent
    /// callers asking for the same key compute it once. It may populate
    /// other categories, but never `category` itself. A read-only cache
    /// computes without storing.
    pub fn get_or_populate<F>(&self, category: Category, key: Key, estimate: F) -> Result<CachedValue>
    where
        F: FnOnce() -> Result<CachedValue>,
    {
        if let Some(value) = self.get(category, key) {
            return Ok(value);
        }
        if self.is_read_only() {
            return estimate();
        }

        let value = {
            let _guard = self.lock(category)?;
            if let Some(value) = self.get(category, key) {
                return Ok(value);
            }
            let value = estimate()?;
            self.insert_locked(category, key, value.clone());
            value
        };
        self.enforce_bound(category)?;
        Ok(value)
    }

    /// Drop a single entry
    pub fn remove(&self, category: Category, key: Key) -> Result<Option<CachedValue>> {
        let _guard = self.lock(category)?;
        let removed = self.store(category).entries.remove(&key).map(|(_, v)| v);
        if removed.is_some() {
            self.counter(category.tier()).fetch_sub(1, Ordering::AcqRel);
        }
        Ok(removed)
    }

    /// Drop every entry of a category
    pub fn evict_all(&self, category: Category) -> Result<()> {
        let _guard = self.lock(category)?;
        self.clear_locked(category);
        Ok(())
    }

    /// Drop all entries and the selection state
    pub fn clear(&self) -> Result<()> {
        for category in Category::ALL {
            self.evict_all(category)?;
        }
        self.clear_selection()
    }

    /// Drop the memoized peptide and PSM lists and the protein orderings
    pub fn clear_selection(&self) -> Result<()> {
        self.peptide_slot()?.clear();
        self.psm_slot()?.clear();
        *self.protein_ordering()? = ProteinOrdering::default();
        Ok(())
    }

    fn lock(&self, category: Category) -> Result<MutexGuard<'_, ()>> {
        self.store(category)
            .lock
            .lock()
            .map_err(|_| Error::CachePoisoned(category))
    }

    /// Caller must hold the category mutex
    fn insert_locked(&self, category: Category, key: Key, value: CachedValue) -> bool {
        match self.store(category).entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                self.counter(category.tier()).fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    /// Caller must hold the category mutex
    fn clear_locked(&self, category: Category) -> usize {
        let entries = &self.store(category).entries;
        let cleared = entries.len();
        entries.clear();
        self.counter(category.tier())
            .fetch_sub(cleared, Ordering::AcqRel);
        cleared
    }

    /// Clear whole categories of the tier of `written` (but never `written`
    /// itself) until the tier is back under its bound. Categories whose
    /// mutex is busy are skipped, a poisoned one is an error.
    fn enforce_bound(&self, written: Category) -> Result<()> {
        let tier = written.tier();
        let bound = self.bounds.get(tier);
        if self.len(tier) <= bound {
            return Ok(());
        }

        for victim in Category::ALL
            .into_iter()
            .filter(|c| c.tier() == tier && *c != written)
        {
            if self.len(tier) <= bound {
                break;
            }
            let _guard = match self.store(victim).lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => {
                    log::warn!("cannot evict `{:?}`: its mutex is poisoned", victim);
                    return Err(Error::CachePoisoned(victim));
                }
            };
            let cleared = self.clear_locked(victim);
            if cleared > 0 {
                log::trace!("evicted {} cached `{:?}` entries", cleared, victim);
            }
        }
        Ok(())
    }

    pub(crate) fn peptide_slot(&self) -> Result<MutexGuard<'_, SingleSlot<Key, Arc<Vec<Key>>>>> {
        self.selection
            .peptides
            .lock()
            .map_err(|_| Error::SelectionPoisoned)
    }

    pub(crate) fn psm_slot(&self) -> Result<MutexGuard<'_, SingleSlot<Key, PsmList>>> {
        self.selection
            .psms
            .lock()
            .map_err(|_| Error::SelectionPoisoned)
    }

    pub(crate) fn protein_ordering(&self) -> Result<MutexGuard<'_, ProteinOrdering>> {
        self.selection
            .proteins
            .lock()
            .map_err(|_| Error::SelectionPoisoned)
    }

    /// Serializable image of every category map, keys ascending
    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = Category::ALL
            .into_iter()
            .filter_map(|category| {
                let mut values = self
                    .store(category)
                    .entries
                    .iter()
                    .map(|entry| (*entry.key(), entry.value().clone()))
                    .collect::<Vec<_>>();
                if values.is_empty() {
                    return None;
                }
                values.sort_by_key(|(key, _)| *key);
                Some((category, values))
            })
            .collect();
        CacheSnapshot {
            bounds: self.bounds,
            entries,
        }
    }

    /// Rebuild a cache from a snapshot. The result is read-only until
    /// reactivated with [`FeaturesCache::set_read_only`]
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        let cache = FeaturesCache::new(snapshot.bounds);
        for (category, values) in snapshot.entries {
            for (key, value) in values {
                cache.insert_locked(category, key, value);
            }
        }
        cache.set_read_only(true);
        cache
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub bounds: CacheBounds,
    pub entries: Vec<(Category, Vec<(Key, CachedValue)>)>,
}
