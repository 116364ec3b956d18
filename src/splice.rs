//! Changesets as plain text splices, and moving changesets between pools.

use crate::assembler::MergingAssembler;
use crate::attribs::AttribSet;
use crate::builder::Builder;
use crate::changeset::Changeset;
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{OpKind, parse_ops, write_ops};
use crate::pool::AttributePool;

/// Replace the chars `start..end` of the old text with `text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Splice {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Splice {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Splice {
        Splice {
            start,
            end,
            text: text.into(),
        }
    }
}

/// The changeset that leaves a document of `len` chars unchanged.
pub fn identity(len: usize) -> Changeset {
    Changeset::identity(len)
}

/// The changeset that turns `orig` into `orig[..start] + ins + orig[start + ndel..]`.
///
/// `start` and `ndel` are clamped to the text.
pub fn make_splice(
    orig: &str,
    start: usize,
    ndel: usize,
    ins: &str,
    attribs: AttribSet,
) -> Result<Changeset> {
    let orig_len = orig.chars().count();
    let start = start.min(orig_len);
    let ndel = ndel.min(orig_len - start);

    let mut cursor = CharCursor::new(orig);
    let before = cursor.take(start).unwrap_or_default();
    let deleted = cursor.take(ndel).unwrap_or_default();

    let mut builder = Builder::new(orig_len);
    builder
        .keep_text(before, AttribSet::new())
        .remove(ndel, deleted.matches('\n').count())
        .insert_with(ins, attribs);
    builder.to_changeset()
}

/// Every contiguous run of removes and inserts, in old-text coordinates.
pub fn to_splices(cs: &Changeset) -> Vec<Splice> {
    let mut splices: Vec<Splice> = Vec::new();
    let mut bank = CharCursor::new(cs.char_bank());
    let mut old_pos = 0;
    let mut in_splice = false;
    for op in cs.ops() {
        if op.kind == OpKind::Keep {
            old_pos += op.chars;
            in_splice = false;
            continue;
        }
        if !in_splice {
            splices.push(Splice::new(old_pos, old_pos, ""));
            in_splice = true;
        }
        let Some(splice) = splices.last_mut() else {
            continue;
        };
        match op.kind {
            OpKind::Remove => {
                old_pos += op.chars;
                splice.end += op.chars;
            }
            OpKind::Insert => splice.text.push_str(bank.take(op.chars).unwrap_or_default()),
            OpKind::Keep => {}
        }
    }
    splices
}

fn check_ids(attribs: &AttribSet, pool: &AttributePool) -> Result<()> {
    if let Some(id) = attribs.iter().find(|&id| pool.get(id).is_none()) {
        return Err(Error::PoolInconsistency(format!("attribute {id} is not in the pool")));
    }
    Ok(())
}

/// Rewrite `cs` so its attribute ids refer to `to` instead of `from`,
/// interning whatever `to` is missing.
pub fn move_to_pool(
    cs: &Changeset,
    from: &AttributePool,
    to: &mut AttributePool,
) -> Result<Changeset> {
    let mut ops = Vec::with_capacity(cs.ops().len());
    for op in cs.ops() {
        check_ids(&op.attribs, from)?;
        let attribs = op.attribs.move_to(from, to);
        ops.push(op.clone().with_attribs(attribs));
    }
    Changeset::new(cs.old_len(), ops, cs.char_bank())
}

/// Same as [`move_to_pool`], for an attribution string.
pub fn move_attribution_to_pool(
    attribution: &str,
    from: &AttributePool,
    to: &mut AttributePool,
) -> Result<String> {
    let mut assem = MergingAssembler::new();
    for op in parse_ops(attribution)? {
        check_ids(&op.attribs, from)?;
        let attribs = op.attribs.move_to(from, to);
        assem.append(op.with_attribs(attribs));
    }
    Ok(write_ops(&assem.take()))
}

/// Renumber `cs` against a fresh pool that holds only the attributes it
/// uses, ready to send to a peer with a different pool.
pub fn prepare_for_wire(
    cs: &Changeset,
    pool: &AttributePool,
) -> Result<(Changeset, AttributePool)> {
    let mut wire_pool = AttributePool::new();
    let cs = move_to_pool(cs, pool, &mut wire_pool)?;
    Ok((cs, wire_pool))
}
