//! Attribute sets carried by ops, and the two ways of merging them.
//!
//! An [`AttribSet`] is the canonical form of an op's `*n*m` markers: pool
//! ids, deduplicated, in ascending id order. Whether an empty value means
//! "clear this key" or "no such attribute" depends on context, which is why
//! [`compose_attributes`] takes a `result_is_mutation` flag.

use std::fmt;

use smallvec::SmallVec;

use crate::base36;
use crate::error::{Error, Result};
use crate::pool::{Attrib, AttribId, AttributePool};

/// Canonical set of attribute ids attached to an op.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttribSet(SmallVec<[AttribId; 4]>);

impl AttribSet {
    pub fn new() -> AttribSet {
        AttribSet(SmallVec::new())
    }

    /// Build a set from ids in any order.
    pub fn from_ids(ids: impl IntoIterator<Item = AttribId>) -> AttribSet {
        let mut ids: SmallVec<[AttribId; 4]> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        AttribSet(ids)
    }

    /// Intern `pairs` as attributes of inserted text. Empty values are
    /// dropped, and a later pair overrides an earlier one with the same key.
    pub fn for_insert(
        pairs: impl IntoIterator<Item = Attrib>,
        pool: &mut AttributePool,
    ) -> AttribSet {
        Self::from_pairs(pairs, pool, true)
    }

    /// Intern `pairs` as a formatting change on kept text. Empty values are
    /// kept: they instruct the receiver to clear that key.
    pub fn for_keep(
        pairs: impl IntoIterator<Item = Attrib>,
        pool: &mut AttributePool,
    ) -> AttribSet {
        Self::from_pairs(pairs, pool, false)
    }

    fn from_pairs(
        pairs: impl IntoIterator<Item = Attrib>,
        pool: &mut AttributePool,
        empty_value_is_delete: bool,
    ) -> AttribSet {
        let mut merged: Vec<Attrib> = Vec::new();
        for attrib in pairs {
            merged.retain(|a| a.key() != attrib.key());
            if !(empty_value_is_delete && attrib.value().is_empty()) {
                merged.push(attrib);
            }
        }
        AttribSet::from_ids(merged.into_iter().map(|a| pool.put(a)))
    }

    /// Parse a bare marker string such as `*0*1c`.
    pub fn parse(s: &str) -> Result<AttribSet> {
        let bytes = s.as_bytes();
        let mut set = AttribSet::new();
        let mut pos = 0;
        while pos < bytes.len() {
            if bytes[pos] != b'*' {
                return Err(Error::parse(pos, "expected '*'"));
            }
            let start = pos + 1;
            let mut end = start;
            while end < bytes.len() && base36::is_digit(bytes[end]) {
                end += 1;
            }
            let id = base36::decode(&s[start..end])
                .ok_or_else(|| Error::parse(start, "expected an attribute number"))?;
            set.push_ascending(id, pos)?;
            pos = end;
        }
        Ok(set)
    }

    /// Append an id parsed from the wire, which must be strictly greater
    /// than every id already present.
    pub(crate) fn push_ascending(&mut self, id: usize, offset: usize) -> Result<()> {
        let id = u32::try_from(id)
            .map(AttribId)
            .map_err(|_| Error::parse(offset, "attribute number out of range"))?;
        if self.0.last().is_some_and(|&last| last >= id) {
            return Err(Error::parse(offset, "attributes are not in ascending order"));
        }
        self.0.push(id);
        Ok(())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = AttribId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, id: AttribId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Resolve every id through the pool.
    pub fn resolve<'p>(&self, pool: &'p AttributePool) -> Result<Vec<&'p Attrib>> {
        self.iter().map(|id| pool.require(id)).collect()
    }

    /// Value this set assigns to `key`, if any.
    pub fn value_of<'p>(&self, key: &str, pool: &'p AttributePool) -> Option<&'p str> {
        self.iter()
            .filter_map(|id| pool.get(id))
            .find(|a| a.key() == key)
            .map(Attrib::value)
    }

    /// Copy of this set with `attrib` replacing whatever value its key had.
    pub fn with(&self, attrib: Attrib, pool: &mut AttributePool) -> AttribSet {
        let key = attrib.key().to_owned();
        let id = pool.put(attrib);
        let kept = self.iter().filter(|&other| pool.key(other) != key);
        AttribSet::from_ids(kept.chain(std::iter::once(id)).collect::<Vec<_>>())
    }

    /// Map every id into another pool. Ids missing from `from` are dropped.
    pub fn move_to(&self, from: &AttributePool, to: &mut AttributePool) -> AttribSet {
        let moved: Vec<AttribId> = self
            .iter()
            .filter_map(|id| from.get(id))
            .map(|attrib| to.put(attrib.clone()))
            .collect();
        AttribSet::from_ids(moved)
    }
}

impl fmt::Display for AttribSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.iter() {
            f.write_str("*")?;
            base36::write(f, id.0 as usize)?;
        }
        Ok(())
    }
}

/// Merge `att2` on top of `att1`; `att2` wins per key.
///
/// With `result_is_mutation` the result is itself a change (two keeps being
/// composed) and empty values survive as "clear" instructions. Without it the
/// result describes present attributes (inserted text, attribution strings),
/// so an empty value removes the key.
pub fn compose_attributes(
    att1: &AttribSet,
    att2: &AttribSet,
    result_is_mutation: bool,
    pool: &AttributePool,
) -> Result<AttribSet> {
    if att1.is_empty() && result_is_mutation {
        return Ok(att2.clone());
    }
    if att2.is_empty() {
        return Ok(att1.clone());
    }
    let mut entries: SmallVec<[(&str, AttribId); 8]> = SmallVec::new();
    for id in att1.iter() {
        let key = pool.require(id)?.key();
        entries.retain(|(k, _)| *k != key);
        entries.push((key, id));
    }
    for id in att2.iter() {
        let attrib = pool.require(id)?;
        entries.retain(|(k, _)| *k != attrib.key());
        if result_is_mutation || !attrib.value().is_empty() {
            entries.push((attrib.key(), id));
        }
    }
    Ok(AttribSet::from_ids(entries.into_iter().map(|(_, id)| id)))
}

/// Attributes of `att2` that still need applying after `att1` has been
/// applied to the same text. On a key conflict the lexically smaller value
/// wins, so `att2`'s value is dropped when `att1`'s is smaller or equal.
pub fn follow_attributes(
    att1: &AttribSet,
    att2: &AttribSet,
    pool: &AttributePool,
) -> Result<AttribSet> {
    if att2.is_empty() {
        return Ok(AttribSet::new());
    }
    if att1.is_empty() {
        return Ok(att2.clone());
    }
    let mut kept: SmallVec<[(&Attrib, AttribId); 8]> = SmallVec::new();
    for id in att2.iter() {
        let attrib = pool.require(id)?;
        kept.retain(|(a, _)| a.key() != attrib.key());
        kept.push((attrib, id));
    }
    for id in att1.iter() {
        let attrib = pool.require(id)?;
        kept.retain(|(a, _)| !(a.key() == attrib.key() && attrib.value() <= a.value()));
    }
    Ok(AttribSet::from_ids(kept.into_iter().map(|(_, id)| id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> (AttributePool, AttribId, AttribId, AttribId) {
        let mut pool = AttributePool::new();
        let bold_clear = pool.put(Attrib::new("bold", ""));
        let bold = pool.put(Attrib::new("bold", "true"));
        let author = pool.put(Attrib::new("author", "a1"));
        (pool, bold_clear, bold, author)
    }

    #[test]
    fn parse_and_display() {
        let set = AttribSet::parse("*0*1c").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![AttribId(0), AttribId(48)]);
        assert_eq!(set.to_string(), "*0*1c");
        assert_eq!(AttribSet::parse("").unwrap(), AttribSet::new());
    }

    #[test]
    fn parse_rejects_unsorted_and_duplicates() {
        assert!(AttribSet::parse("*1*0").is_err());
        assert!(AttribSet::parse("*1*1").is_err());
        assert!(AttribSet::parse("*").is_err());
        assert!(AttribSet::parse("1").is_err());
    }

    #[test]
    fn insert_drops_empty_values_keep_retains_them() {
        let mut pool = AttributePool::new();
        let insert = AttribSet::for_insert([Attrib::new("bold", "")], &mut pool);
        assert!(insert.is_empty());
        let keep = AttribSet::for_keep([Attrib::new("bold", "")], &mut pool);
        assert_eq!(keep.len(), 1);
        assert_eq!(keep.value_of("bold", &pool), Some(""));
    }

    #[test]
    fn later_pair_overrides_earlier() {
        let mut pool = AttributePool::new();
        let set = AttribSet::for_insert(
            [Attrib::new("bold", "true"), Attrib::new("bold", "false")],
            &mut pool,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.value_of("bold", &pool), Some("false"));
    }

    #[test]
    fn compose_examples() {
        let (pool, clear, bold, _) = pool();
        let empty = AttribSet::new();
        let clear = AttribSet::from_ids([clear]);
        let bold = AttribSet::from_ids([bold]);

        assert_eq!(compose_attributes(&empty, &clear, true, &pool).unwrap(), clear);
        assert_eq!(compose_attributes(&empty, &clear, false, &pool).unwrap(), empty);
        assert_eq!(compose_attributes(&empty, &bold, true, &pool).unwrap(), bold);
        assert_eq!(compose_attributes(&empty, &bold, false, &pool).unwrap(), bold);
        assert_eq!(compose_attributes(&bold, &clear, true, &pool).unwrap(), clear);
        assert_eq!(compose_attributes(&bold, &clear, false, &pool).unwrap(), empty);
    }

    #[test]
    fn compose_keeps_unrelated_keys() {
        let (pool, _, bold, author) = pool();
        let a = AttribSet::from_ids([author]);
        let b = AttribSet::from_ids([bold]);
        let merged = compose_attributes(&a, &b, false, &pool).unwrap();
        assert_eq!(merged, AttribSet::from_ids([bold, author]));
    }

    #[test]
    fn compose_reports_missing_ids() {
        let (pool, _, bold, _) = pool();
        let a = AttribSet::from_ids([bold]);
        let b = AttribSet::from_ids([AttribId(99)]);
        assert!(matches!(
            compose_attributes(&a, &b, true, &pool),
            Err(Error::PoolInconsistency(_))
        ));
    }

    #[test]
    fn follow_prefers_smaller_value() {
        let (pool, clear, bold, author) = pool();
        let clear = AttribSet::from_ids([clear]);
        let bold = AttribSet::from_ids([bold]);
        // "" < "true": the clear wins in both directions.
        assert_eq!(follow_attributes(&clear, &bold, &pool).unwrap(), AttribSet::new());
        assert_eq!(follow_attributes(&bold, &clear, &pool).unwrap(), clear);
        // Same value: nothing left to apply.
        assert_eq!(follow_attributes(&bold, &bold, &pool).unwrap(), AttribSet::new());
        // Unrelated keys pass through.
        let author = AttribSet::from_ids([author]);
        assert_eq!(follow_attributes(&author, &bold, &pool).unwrap(), bold);
    }

    #[test]
    fn with_replaces_key() {
        let (mut pool, _, bold, author) = pool();
        let set = AttribSet::from_ids([bold, author]);
        let replaced = set.with(Attrib::new("author", "a2"), &mut pool);
        assert_eq!(replaced.value_of("author", &pool), Some("a2"));
        assert_eq!(replaced.value_of("bold", &pool), Some("true"));
        assert_eq!(replaced.len(), 2);
    }
}
