//! Storage adapter boundary
//!
//! Adapters translate entities to and from a [`StorageElement`], a flat bag of
//! typed properties a database driver can persist. Loading never fails with an
//! error: it returns a [`DataResult`] naming what went wrong, so a caller
//! iterating stored records can skip the unreadable ones.
//!
//! Unit enums are stored as their ordinal.

use std::collections::BTreeMap;
use std::fmt;

use bigdecimal::BigDecimal;
use tracing::{trace, warn};

use crate::data::{HUnit, HumidityData, LUnit, LuminosityData, NUnit, NoiseData};
use crate::hash::{Hash, Hashers};
use crate::merkle::{MerkleTree, MerkleTreeImpl, MutableMerkleTree};
use crate::merkle_storage::StorageAwareMerkleTree;
use crate::types::Measurement;

/// Entity kinds that have a storage schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
pub enum AdapterIds {
    Block,
    BlockHeader,
    BlockParams,
    Coinbase,
    CoinbaseParams,
    LedgerData,
    LedgerId,
    LedgerParams,
    MerkleTree,
    PhysicalData,
    Transaction,
    TransactionOutput,
}

impl AdapterIds {
    pub fn name(&self) -> &'static str {
        match self {
            AdapterIds::Block => "Block",
            AdapterIds::BlockHeader => "BlockHeader",
            AdapterIds::BlockParams => "BlockParams",
            AdapterIds::Coinbase => "Coinbase",
            AdapterIds::CoinbaseParams => "CoinbaseParams",
            AdapterIds::LedgerData => "LedgerData",
            AdapterIds::LedgerId => "LedgerId",
            AdapterIds::LedgerParams => "LedgerParams",
            AdapterIds::MerkleTree => "MerkleTree",
            AdapterIds::PhysicalData => "PhysicalData",
            AdapterIds::Transaction => "Transaction",
            AdapterIds::TransactionOutput => "TransactionOutput",
        }
    }
}

impl fmt::Display for AdapterIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Property types a storage backend must support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Integer,
    IntegerList,
    Decimal,
    String,
    Hash,
    HashList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageValue {
    Integer(i64),
    IntegerList(Vec<i64>),
    Decimal(BigDecimal),
    String(String),
    Hash(Hash),
    HashList(Vec<Hash>),
}

impl StorageValue {
    pub fn storage_type(&self) -> StorageType {
        match self {
            StorageValue::Integer(_) => StorageType::Integer,
            StorageValue::IntegerList(_) => StorageType::IntegerList,
            StorageValue::Decimal(_) => StorageType::Decimal,
            StorageValue::String(_) => StorageType::String,
            StorageValue::Hash(_) => StorageType::Hash,
            StorageValue::HashList(_) => StorageType::HashList,
        }
    }
}

/// Outcome of loading an entity from storage
#[derive(Debug, Clone, PartialEq)]
pub enum DataResult<T> {
    Success(T),
    /// A required property is absent
    NonExistentData(String),
    /// A unit discriminant outside the known ordinals
    UnrecognizedUnit(String),
    /// Wrong schema, or a property of the wrong type
    UnrecognizedDataType(String),
    /// A nested load or a domain check failed
    Propagated(String),
}

impl<T> DataResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, DataResult::Success(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            DataResult::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DataResult<U> {
        match self {
            DataResult::Success(value) => DataResult::Success(f(value)),
            DataResult::NonExistentData(m) => DataResult::NonExistentData(m),
            DataResult::UnrecognizedUnit(m) => DataResult::UnrecognizedUnit(m),
            DataResult::UnrecognizedDataType(m) => DataResult::UnrecognizedDataType(m),
            DataResult::Propagated(m) => DataResult::Propagated(m),
        }
    }
}

/// Why a property could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    Missing(String),
    WrongType { name: String, expected: StorageType },
}

impl<T> From<PropertyError> for DataResult<T> {
    fn from(error: PropertyError) -> Self {
        match error {
            PropertyError::Missing(name) => DataResult::NonExistentData(format!("missing property {}", name)),
            PropertyError::WrongType { name, expected } => {
                DataResult::UnrecognizedDataType(format!("property {} is not {:?}", name, expected))
            }
        }
    }
}

type PropertyResult<T> = std::result::Result<T, PropertyError>;

/// In-memory property bag handed to and from a storage driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageElement {
    schema: String,
    properties: BTreeMap<String, StorageValue>,
}

macro_rules! typed_getter {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, name: &str) -> PropertyResult<&$ty> {
            match self.get(name)? {
                StorageValue::$variant(value) => Ok(value),
                _ => Err(PropertyError::WrongType { name: name.to_string(), expected: StorageType::$variant }),
            }
        }
    };
}

impl StorageElement {
    pub fn new(schema: impl Into<String>) -> Self {
        Self { schema: schema.into(), properties: BTreeMap::new() }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn with(mut self, name: &str, value: StorageValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: StorageValue) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> PropertyResult<&StorageValue> {
        self.properties.get(name).ok_or_else(|| PropertyError::Missing(name.to_string()))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &StorageValue)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value))
    }

    typed_getter!(integer, Integer, i64);
    typed_getter!(integer_list, IntegerList, Vec<i64>);
    typed_getter!(decimal, Decimal, BigDecimal);
    typed_getter!(string, String, String);
    typed_getter!(hash, Hash, Hash);
    typed_getter!(hash_list, HashList, Vec<Hash>);

    fn measurement(&self, name: &str) -> PropertyResult<Measurement> {
        Ok(Measurement::new(self.decimal(name)?.clone()))
    }
}

/// Schema of a storable entity: its id and typed properties
pub trait SchemaProvider {
    fn id(&self) -> &'static str;

    fn properties(&self) -> BTreeMap<&'static str, StorageType>;

    /// Element with this schema's id and `values`, checked against the schema
    fn element(&self, values: Vec<(&'static str, StorageValue)>) -> StorageElement {
        let schema = self.properties();
        let mut element = StorageElement::new(self.id());
        for (name, value) in values {
            debug_assert_eq!(schema.get(name), Some(&value.storage_type()), "{} is not in the schema of {}", name, self.id());
            element.set(name, value);
        }
        element
    }
}

pub trait StorageAdapter<T>: SchemaProvider {
    fn store(&self, value: &T) -> StorageElement;

    fn load(&self, element: &StorageElement) -> DataResult<T>;
}

/// Checks the schema id, then runs `load`, converting property errors
fn common_load<T>(
    element: &StorageElement,
    id: &str,
    load: impl FnOnce(&StorageElement) -> PropertyResult<DataResult<T>>,
) -> DataResult<T> {
    if element.schema() != id {
        return DataResult::UnrecognizedDataType(format!("expected {}, found {}", id, element.schema()));
    }
    load(element).unwrap_or_else(DataResult::from)
}

fn unrecognized_unit<T>(schema: &str, ordinal: i64) -> DataResult<T> {
    warn!(schema, ordinal, "unrecognized unit ordinal in stored element");
    DataResult::UnrecognizedUnit(format!("unit is not one of the expected: {}", ordinal))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HumidityStorageAdapter;

impl SchemaProvider for HumidityStorageAdapter {
    fn id(&self) -> &'static str {
        "HumidityData"
    }

    fn properties(&self) -> BTreeMap<&'static str, StorageType> {
        BTreeMap::from([("hum", StorageType::Decimal), ("unit", StorageType::Integer)])
    }
}

impl StorageAdapter<HumidityData> for HumidityStorageAdapter {
    fn store(&self, value: &HumidityData) -> StorageElement {
        self.element(vec![
            ("hum", StorageValue::Decimal(value.hum.as_decimal().clone())),
            ("unit", StorageValue::Integer(value.unit.ordinal().into())),
        ])
    }

    fn load(&self, element: &StorageElement) -> DataResult<HumidityData> {
        common_load(element, self.id(), |e| {
            let ordinal = *e.integer("unit")?;
            Ok(match HUnit::from_ordinal(ordinal) {
                Some(unit) => DataResult::Success(HumidityData { hum: e.measurement("hum")?, unit }),
                None => unrecognized_unit(self.id(), ordinal),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LuminosityStorageAdapter;

impl SchemaProvider for LuminosityStorageAdapter {
    fn id(&self) -> &'static str {
        "LuminosityData"
    }

    fn properties(&self) -> BTreeMap<&'static str, StorageType> {
        BTreeMap::from([("lum", StorageType::Decimal), ("unit", StorageType::Integer)])
    }
}

impl StorageAdapter<LuminosityData> for LuminosityStorageAdapter {
    fn store(&self, value: &LuminosityData) -> StorageElement {
        self.element(vec![
            ("lum", StorageValue::Decimal(value.lum.as_decimal().clone())),
            ("unit", StorageValue::Integer(value.unit.ordinal().into())),
        ])
    }

    fn load(&self, element: &StorageElement) -> DataResult<LuminosityData> {
        common_load(element, self.id(), |e| {
            let ordinal = *e.integer("unit")?;
            Ok(match LUnit::from_ordinal(ordinal) {
                Some(unit) => DataResult::Success(LuminosityData { lum: e.measurement("lum")?, unit }),
                None => unrecognized_unit(self.id(), ordinal),
            })
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseStorageAdapter;

impl SchemaProvider for NoiseStorageAdapter {
    fn id(&self) -> &'static str {
        "NoiseData"
    }

    fn properties(&self) -> BTreeMap<&'static str, StorageType> {
        BTreeMap::from([
            ("noise_level", StorageType::Decimal),
            ("peak_or_base", StorageType::Decimal),
            ("unit", StorageType::Integer),
        ])
    }
}

impl StorageAdapter<NoiseData> for NoiseStorageAdapter {
    fn store(&self, value: &NoiseData) -> StorageElement {
        self.element(vec![
            ("noise_level", StorageValue::Decimal(value.noise_level.as_decimal().clone())),
            ("peak_or_base", StorageValue::Decimal(value.peak_or_base.as_decimal().clone())),
            ("unit", StorageValue::Integer(value.unit.ordinal().into())),
        ])
    }

    fn load(&self, element: &StorageElement) -> DataResult<NoiseData> {
        common_load(element, self.id(), |e| {
            let ordinal = *e.integer("unit")?;
            Ok(match NUnit::from_ordinal(ordinal) {
                Some(unit) => DataResult::Success(NoiseData {
                    noise_level: e.measurement("noise_level")?,
                    peak_or_base: e.measurement("peak_or_base")?,
                    unit,
                }),
                None => unrecognized_unit(self.id(), ordinal),
            })
        })
    }
}

/// Stores a Merkle tree as its hasher id, collapsed nodes and level offsets
#[derive(Debug, Clone, Copy, Default)]
pub struct MerkleTreeStorageAdapter;

impl MerkleTreeStorageAdapter {
    /// Writes only the nodes a storage-aware tree marked dirty into a
    /// previously stored element, then clears the dirty set
    ///
    /// A replaced tree, or an element that does not hold a tree, is stored
    /// in full.
    pub fn store_changes<T: MutableMerkleTree>(&self, tree: &mut StorageAwareMerkleTree<T>, element: &mut StorageElement) {
        let mut levels = match self.stored_levels(element) {
            Some(levels) if !tree.was_replaced() => levels,
            _ => {
                *element = self.store_tree(&*tree);
                tree.take_dirty();
                return;
            }
        };

        // Positions are ordered by level, then index, so new nodes arrive in order
        let positions = tree.take_dirty();
        for position in &positions {
            if let Some(node) = tree.node(*position) {
                if levels.len() <= position.level {
                    levels.resize_with(position.level + 1, Vec::new);
                }
                let level = &mut levels[position.level];
                if position.index < level.len() {
                    level[position.index] = node.clone();
                } else {
                    level.push(node.clone());
                }
            }
        }

        let mut offset = 0i64;
        let level_index = levels
            .iter()
            .map(|level| {
                let start = offset;
                offset += level.len() as i64;
                start
            })
            .collect();
        element.set("collapsed_tree", StorageValue::HashList(levels.concat()));
        element.set("level_index", StorageValue::IntegerList(level_index));
        trace!(nodes = positions.len(), "stored dirty merkle nodes");
    }

    fn stored_levels(&self, element: &StorageElement) -> Option<Vec<Vec<Hash>>> {
        if element.schema() != self.id() {
            return None;
        }
        let nodes = element.hash_list("collapsed_tree").ok()?;
        let starts = element.integer_list("level_index").ok()?;
        let mut levels = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(nodes.len() as i64);
            let (start, end) = (usize::try_from(start).ok()?, usize::try_from(end).ok()?);
            levels.push(nodes.get(start..end)?.to_vec());
        }
        Some(levels)
    }

    fn store_tree<M: MerkleTree>(&self, tree: &M) -> StorageElement {
        self.element(vec![
            ("hasher", StorageValue::Hash(tree.hasher().id())),
            ("collapsed_tree", StorageValue::HashList(tree.collapsed_tree())),
            (
                "level_index",
                StorageValue::IntegerList(tree.level_index().into_iter().map(|i| i as i64).collect()),
            ),
        ])
    }
}

impl SchemaProvider for MerkleTreeStorageAdapter {
    fn id(&self) -> &'static str {
        AdapterIds::MerkleTree.name()
    }

    fn properties(&self) -> BTreeMap<&'static str, StorageType> {
        BTreeMap::from([
            ("hasher", StorageType::Hash),
            ("collapsed_tree", StorageType::HashList),
            ("level_index", StorageType::IntegerList),
        ])
    }
}

impl StorageAdapter<MerkleTreeImpl> for MerkleTreeStorageAdapter {
    fn store(&self, value: &MerkleTreeImpl) -> StorageElement {
        self.store_tree(value)
    }

    fn load(&self, element: &StorageElement) -> DataResult<MerkleTreeImpl> {
        common_load(element, self.id(), |e| {
            let hasher = match Hashers::from_id(e.hash("hasher")?) {
                Ok(hasher) => hasher,
                Err(err) => return Ok(DataResult::Propagated(err.to_string())),
            };
            let mut level_index = Vec::new();
            for &offset in e.integer_list("level_index")? {
                match usize::try_from(offset) {
                    Ok(offset) => level_index.push(offset),
                    Err(_) => return Ok(DataResult::Propagated(format!("negative level offset {}", offset))),
                }
            }
            let nodes = e.hash_list("collapsed_tree")?.clone();
            Ok(match MerkleTreeImpl::from_collapsed(hasher, nodes, level_index) {
                Ok(tree) => DataResult::Success(tree),
                Err(err) => DataResult::Propagated(err.to_string()),
            })
        })
    }
}
