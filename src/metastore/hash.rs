use crate::error::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Content hash of a Metastore entity's dedup key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(pub [u8; 16]);

impl Id {
    /// Hashes the canonical bincode encoding of `key`, prefixed by the entity
    /// kind so that equal keys of different kinds never share an ID.
    pub fn of<K: Serialize>(kind: EntityKind, key: &K) -> anyhow::Result<Self> {
        let encoded = bincode::serialize(key)?;
        let mut hasher = Xxh3::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&encoded);
        Ok(Self(hasher.digest128().to_be_bytes()))
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(32);
        for b in self.0.iter() {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

macro_rules! entity_id {
    ($name:ident, $kind:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Id);

        impl $name {
            pub const KIND: EntityKind = $kind;

            pub(crate) fn storage_key(&self) -> String {
                format!("{}/{}", Self::KIND, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

entity_id!(MappingId, EntityKind::Mapping);
entity_id!(FunctionId, EntityKind::Function);
entity_id!(LocationId, EntityKind::Location);
entity_id!(StacktraceId, EntityKind::Stacktrace);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_structural() {
        let a = Id::of(EntityKind::Function, &("main", "main.c", 10i64)).unwrap();
        let b = Id::of(EntityKind::Function, &("main".to_string(), "main.c", 10i64)).unwrap();
        assert_eq!(a, b);

        let c = Id::of(EntityKind::Function, &("main", "main.c", 11i64)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn kind_is_part_of_the_hash() {
        let key = vec![1u8, 2, 3];
        let a = Id::of(EntityKind::Location, &key).unwrap();
        let b = Id::of(EntityKind::Stacktrace, &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn storage_key_layout() {
        let id = StacktraceId(Id([0xab; 16]));
        assert_eq!(
            id.storage_key(),
            format!("stacktraces/{}", "ab".repeat(16))
        );
    }
}
