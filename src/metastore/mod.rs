mod backend;
mod hash;
mod persistent;
mod types;

pub use backend::{MemoryBackend, MetastoreBackend, PutOutcome};
pub use hash::{FunctionId, Id, LocationId, MappingId, StacktraceId};
pub use persistent::ObjectStoreBackend;
pub use types::{Function, Line, Location, Mapping, Stacktrace};

use crate::error::{EntityKind, Error, Result};
use moka::sync::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

/// An immutable, content-addressed Metastore value.
trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;
    const KIND: EntityKind;

    fn id(&self) -> anyhow::Result<Self::Id>;
    fn same_key(&self, other: &Self) -> bool;
    fn storage_key(id: &Self::Id) -> String;
}

macro_rules! impl_entity {
    ($ty:ty, $id:ident) => {
        impl Entity for $ty {
            type Id = $id;
            const KIND: EntityKind = $id::KIND;

            fn id(&self) -> anyhow::Result<$id> {
                Ok($id(Id::of(Self::KIND, &self.key())?))
            }

            fn same_key(&self, other: &Self) -> bool {
                self.key() == other.key()
            }

            fn storage_key(id: &$id) -> String {
                id.storage_key()
            }
        }
    };
}

impl_entity!(Mapping, MappingId);
impl_entity!(Function, FunctionId);
impl_entity!(Location, LocationId);
impl_entity!(Stacktrace, StacktraceId);

/// Content-addressed repository of mappings, functions, locations and
/// stacktraces.
///
/// Every `get_or_create_*` call is idempotent: structurally identical content
/// always resolves to the same ID and is stored once, even when proposed by
/// several callers concurrently. Decoded entities are kept in bounded caches in
/// front of the backend.
#[derive(Debug)]
pub struct Metastore {
    backend: Arc<dyn MetastoreBackend>,
    mappings: Cache<MappingId, Arc<Mapping>>,
    functions: Cache<FunctionId, Arc<Function>>,
    locations: Cache<LocationId, Arc<Location>>,
    stacktraces: Cache<StacktraceId, Arc<Stacktrace>>,
}

impl Metastore {
    pub fn new(backend: Arc<dyn MetastoreBackend>, cache_capacity: u64) -> Self {
        Self {
            backend,
            mappings: Cache::new(cache_capacity),
            functions: Cache::new(cache_capacity),
            locations: Cache::new(cache_capacity),
            stacktraces: Cache::new(cache_capacity),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), 100_000)
    }

    pub async fn get_or_create_mapping(&self, mapping: Mapping) -> Result<MappingId> {
        self.get_or_create(&self.mappings, mapping).await
    }

    pub async fn get_or_create_function(&self, function: Function) -> Result<FunctionId> {
        self.get_or_create(&self.functions, function).await
    }

    /// Fails with `DanglingReference` if the mapping or any frame's function is
    /// unknown.
    pub async fn get_or_create_location(
        &self,
        mapping_id: Option<MappingId>,
        address: u64,
        lines: Vec<Line>,
    ) -> Result<LocationId> {
        if let Some(mapping_id) = mapping_id {
            self.ensure_exists(&self.mappings, mapping_id).await?;
        }
        for line in lines.iter() {
            self.ensure_exists(&self.functions, line.function_id).await?;
        }

        let location = Location {
            mapping_id,
            address,
            lines,
        };
        self.get_or_create(&self.locations, location).await
    }

    /// `location_ids` is leaf first. Fails with `DanglingReference` if any
    /// location is unknown.
    pub async fn get_or_create_stacktrace(
        &self,
        location_ids: Vec<LocationId>,
    ) -> Result<StacktraceId> {
        for id in location_ids.iter() {
            self.ensure_exists(&self.locations, *id).await?;
        }
        self.get_or_create(&self.stacktraces, Stacktrace { location_ids })
            .await
    }

    pub async fn get_mapping(&self, id: MappingId) -> Result<Arc<Mapping>> {
        self.get(&self.mappings, id).await
    }

    pub async fn get_function(&self, id: FunctionId) -> Result<Arc<Function>> {
        self.get(&self.functions, id).await
    }

    pub async fn get_location(&self, id: LocationId) -> Result<Arc<Location>> {
        self.get(&self.locations, id).await
    }

    pub async fn get_stacktrace(&self, id: StacktraceId) -> Result<Arc<Stacktrace>> {
        self.get(&self.stacktraces, id).await
    }

    pub async fn get_mappings(&self, ids: &[MappingId]) -> Result<Vec<Arc<Mapping>>> {
        self.get_many(&self.mappings, ids).await
    }

    pub async fn get_functions(&self, ids: &[FunctionId]) -> Result<Vec<Arc<Function>>> {
        self.get_many(&self.functions, ids).await
    }

    pub async fn get_locations(&self, ids: &[LocationId]) -> Result<Vec<Arc<Location>>> {
        self.get_many(&self.locations, ids).await
    }

    pub async fn get_stacktraces(&self, ids: &[StacktraceId]) -> Result<Vec<Arc<Stacktrace>>> {
        self.get_many(&self.stacktraces, ids).await
    }

    pub async fn contains_stacktrace(&self, id: StacktraceId) -> Result<bool> {
        self.contains(&self.stacktraces, id).await
    }

    pub async fn count(&self, kind: EntityKind) -> Result<usize> {
        self.backend.count(kind).await
    }

    async fn get_or_create<E: Entity>(&self, cache: &Cache<E::Id, Arc<E>>, entity: E) -> Result<E::Id> {
        let id = entity.id()?;
        if let Some(cached) = cache.get(&id) {
            if !cached.same_key(&entity) {
                return Err(collision::<E>(id));
            }
            return Ok(id);
        }

        let encoded = bincode::serialize(&entity)?;
        let stored = match self
            .backend
            .put_if_absent(&E::storage_key(&id), encoded)
            .await?
        {
            PutOutcome::Created => {
                log::trace!("Created {} {}", E::KIND, id);
                entity
            }
            PutOutcome::Existing(bytes) => {
                let existing: E = bincode::deserialize(&bytes)?;
                if !existing.same_key(&entity) {
                    return Err(collision::<E>(id));
                }
                existing
            }
        };

        cache.insert(id, Arc::new(stored));
        Ok(id)
    }

    async fn get<E: Entity>(&self, cache: &Cache<E::Id, Arc<E>>, id: E::Id) -> Result<Arc<E>> {
        if let Some(e) = cache.get(&id) {
            return Ok(e);
        }

        let bytes = self
            .backend
            .get(&E::storage_key(&id))
            .await?
            .ok_or_else(|| Error::not_found(format!("{} {} not found", E::KIND, id)))?;

        let e = Arc::new(bincode::deserialize::<E>(&bytes)?);
        cache.insert(id, Arc::clone(&e));
        Ok(e)
    }

    async fn get_many<E: Entity>(
        &self,
        cache: &Cache<E::Id, Arc<E>>,
        ids: &[E::Id],
    ) -> Result<Vec<Arc<E>>> {
        let mut res = Vec::with_capacity(ids.len());
        for id in ids.iter() {
            res.push(self.get(cache, *id).await?);
        }
        Ok(res)
    }

    async fn contains<E: Entity>(&self, cache: &Cache<E::Id, Arc<E>>, id: E::Id) -> Result<bool> {
        match self.get(cache, id).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_exists<E: Entity>(&self, cache: &Cache<E::Id, Arc<E>>, id: E::Id) -> Result<()> {
        if self.contains(cache, id).await? {
            Ok(())
        } else {
            Err(Error::dangling(E::KIND, id))
        }
    }
}

fn collision<E: Entity>(id: E::Id) -> Error {
    log::error!("Hash collision on {} {}", E::KIND, id);
    Error::internal(format!("hash collision on {} {}", E::KIND, id))
}
