//! Attribute Pool
//!
//! Interns `(key, value)` string pairs as small integer ids so changesets
//! can refer to formatting and authorship compactly.
//!
//! Invariants:
//! - ids are allocated densely from zero and never reused or renumbered
//! - the forward map (id -> pair) and reverse map (pair -> id) agree
//! - the pool only grows

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Id of an interned attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttribId(pub u32);

impl fmt::Display for AttribId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// A `(key, value)` attribute pair. An empty value means "no value".
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attrib(pub String, pub String);

impl Attrib {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Attrib {
        return Attrib(key.into(), value.into());
    }

    #[inline(always)]
    pub fn key(&self) -> &str {
        return &self.0;
    }

    #[inline(always)]
    pub fn value(&self) -> &str {
        return &self.1;
    }
}

/// Wire and storage layout of a pool: `{"numToAttrib": {"0": [k, v]}, "nextNum": 1}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolJson {
    #[serde(rename = "numToAttrib")]
    pub num_to_attrib: BTreeMap<u32, Attrib>,
    #[serde(rename = "nextNum")]
    pub next_num: u32,
}

/// Bidirectional interning table for attributes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(into = "PoolJson", try_from = "PoolJson")]
pub struct AttributePool {
    /// Forward map, indexed by id.
    num_to_attrib: Vec<Attrib>,
    /// Reverse map.
    attrib_to_num: FxHashMap<Attrib, AttribId>,
}

impl AttributePool {
    pub fn new() -> AttributePool {
        return AttributePool::default();
    }

    /// Number of interned attributes; also the next id to be allocated.
    #[inline(always)]
    pub fn len(&self) -> usize {
        return self.num_to_attrib.len();
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        return self.num_to_attrib.is_empty();
    }

    /// Intern an attribute, returning its existing id or allocating the next one.
    pub fn put(&mut self, attrib: Attrib) -> AttribId {
        if let Some(&id) = self.attrib_to_num.get(&attrib) {
            return id;
        }
        let id = AttribId(self.num_to_attrib.len() as u32);
        self.num_to_attrib.push(attrib.clone());
        self.attrib_to_num.insert(attrib, id);
        return id;
    }

    /// Look up an attribute without interning it.
    pub fn lookup(&self, attrib: &Attrib) -> Option<AttribId> {
        return self.attrib_to_num.get(attrib).copied();
    }

    pub fn get(&self, id: AttribId) -> Option<&Attrib> {
        return self.num_to_attrib.get(id.0 as usize);
    }

    /// Like [`AttributePool::get`], but fails with a pool inconsistency.
    pub fn require(&self, id: AttribId) -> Result<&Attrib> {
        return self
            .get(id)
            .ok_or_else(|| {
                Error::PoolInconsistency(format!("attribute {id} does not exist in pool"))
            });
    }

    /// Key of an attribute, or `""` if the id is unknown.
    pub fn key(&self, id: AttribId) -> &str {
        return self.get(id).map_or("", Attrib::key);
    }

    /// Value of an attribute, or `""` if the id is unknown.
    pub fn value(&self, id: AttribId) -> &str {
        return self.get(id).map_or("", Attrib::value);
    }

    /// Iterate over all attributes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (AttribId, &Attrib)> {
        return self
            .num_to_attrib
            .iter()
            .enumerate()
            .map(|(i, attrib)| (AttribId(i as u32), attrib));
    }

    pub fn for_each(&self, mut f: impl FnMut(AttribId, &str, &str)) {
        for (id, attrib) in self.iter() {
            f(id, attrib.key(), attrib.value());
        }
    }

    pub fn to_jsonable(&self) -> PoolJson {
        let num_to_attrib = self
            .iter()
            .map(|(id, attrib)| (id.0, attrib.clone()))
            .collect();
        return PoolJson {
            num_to_attrib,
            next_num: self.num_to_attrib.len() as u32,
        };
    }

    /// Rebuild a pool from its JSON form. The reverse map is recomputed from
    /// the forward map; ids must be dense below `nextNum`.
    pub fn from_jsonable(json: PoolJson) -> Result<AttributePool> {
        if json.num_to_attrib.len() != json.next_num as usize {
            return Err(Error::PoolInconsistency(format!(
                "numToAttrib size mismatch (want {}, got {})",
                json.next_num,
                json.num_to_attrib.len()
            )));
        }
        let mut pool = AttributePool::new();
        for (expected, (num, attrib)) in json.num_to_attrib.into_iter().enumerate() {
            if num as usize != expected {
                return Err(Error::PoolInconsistency(format!("attribute {expected} is missing")));
            }
            pool.attrib_to_num.insert(attrib.clone(), AttribId(num));
            pool.num_to_attrib.push(attrib);
        }
        return Ok(pool);
    }

    /// Verify that the forward and reverse maps agree.
    pub fn check(&self) -> Result<()> {
        if self.attrib_to_num.len() != self.num_to_attrib.len() {
            return Err(Error::PoolInconsistency(format!(
                "attribToNum size mismatch (want {}, got {})",
                self.num_to_attrib.len(),
                self.attrib_to_num.len()
            )));
        }
        for (id, attrib) in self.iter() {
            if self.attrib_to_num.get(attrib) != Some(&id) {
                return Err(Error::PoolInconsistency(format!(
                    "attribToNum for [{}, {}] !== {id}",
                    attrib.key(),
                    attrib.value()
                )));
            }
        }
        return Ok(());
    }
}

impl From<AttributePool> for PoolJson {
    fn from(pool: AttributePool) -> PoolJson {
        return pool.to_jsonable();
    }
}

impl TryFrom<PoolJson> for AttributePool {
    type Error = Error;

    fn try_from(json: PoolJson) -> Result<AttributePool> {
        return AttributePool::from_jsonable(json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent() {
        let mut pool = AttributePool::new();
        let bold = pool.put(Attrib::new("bold", "true"));
        let author = pool.put(Attrib::new("author", "a1"));
        assert_eq!(bold, AttribId(0));
        assert_eq!(author, AttribId(1));
        assert_eq!(pool.put(Attrib::new("bold", "true")), bold);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("bold", "true"));
        assert_eq!(pool.lookup(&Attrib::new("italic", "true")), None);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.lookup(&Attrib::new("bold", "true")), Some(AttribId(0)));
    }

    #[test]
    fn unknown_ids_read_as_empty() {
        let pool = AttributePool::new();
        assert_eq!(pool.get(AttribId(3)), None);
        assert_eq!(pool.key(AttribId(3)), "");
        assert_eq!(pool.value(AttribId(3)), "");
        assert!(matches!(pool.require(AttribId(3)), Err(Error::PoolInconsistency(_))));
    }

    #[test]
    fn json_round_trip() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("author", "a1"));
        pool.put(Attrib::new("bold", ""));
        let json = serde_json::to_string(&pool).unwrap();
        assert_eq!(
            json,
            r#"{"numToAttrib":{"0":["author","a1"],"1":["bold",""]},"nextNum":2}"#
        );
        let back: AttributePool = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_jsonable(), pool.to_jsonable());
        assert_eq!(back.lookup(&Attrib::new("bold", "")), Some(AttribId(1)));
        back.check().unwrap();
    }

    #[test]
    fn from_jsonable_rejects_gaps() {
        let mut num_to_attrib = BTreeMap::new();
        num_to_attrib.insert(0, Attrib::new("a", "1"));
        num_to_attrib.insert(2, Attrib::new("b", "2"));
        let json = PoolJson {
            num_to_attrib,
            next_num: 2,
        };
        assert!(matches!(
            AttributePool::from_jsonable(json),
            Err(Error::PoolInconsistency(_))
        ));
    }

    #[test]
    fn check_detects_duplicate_pairs() {
        let mut num_to_attrib = BTreeMap::new();
        num_to_attrib.insert(0, Attrib::new("a", "1"));
        num_to_attrib.insert(1, Attrib::new("a", "1"));
        let pool = AttributePool::from_jsonable(PoolJson {
            num_to_attrib,
            next_num: 2,
        })
        .unwrap();
        assert!(pool.check().is_err());
    }

    #[test]
    fn clone_is_independent() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("a", "1"));
        let mut copy = pool.clone();
        copy.put(Attrib::new("b", "2"));
        assert_eq!(pool.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
