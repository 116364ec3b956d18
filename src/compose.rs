//! Sequential composition.
//!
//! Composition and attribution-string application share one primitive: walk
//! two op sequences over a common coordinate space, consuming the shorter of
//! the two current ops at each step. [`zip`] drives the walk; [`slice_zip`]
//! is the step shared by both.

use std::cmp::min;

use crate::assembler::SmartAssembler;
use crate::attribs::compose_attributes;
use crate::changeset::Changeset;
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{Op, OpKind};
use crate::pool::AttributePool;

/// Outcome of one zip step: an op to emit, plus whatever is left of the two
/// inputs. A side left at `None` is refilled from its sequence.
#[derive(Debug, Default)]
pub(crate) struct Step {
    pub out: Option<Op>,
    pub left: Option<Op>,
    pub right: Option<Op>,
}

/// Run `step` over two op sequences until both are exhausted. An exhausted
/// side is presented as `None`, which stands for the implicit trailing keep.
pub(crate) fn zip<F>(
    left: impl IntoIterator<Item = Op>,
    right: impl IntoIterator<Item = Op>,
    mut step: F,
) -> Result<SmartAssembler>
where
    F: FnMut(Option<Op>, Option<Op>) -> Result<Step>,
{
    let mut lefts = left.into_iter();
    let mut rights = right.into_iter();
    let mut a: Option<Op> = None;
    let mut b: Option<Op> = None;
    let mut assem = SmartAssembler::new();
    loop {
        if a.is_none() {
            a = lefts.next();
        }
        if b.is_none() {
            b = rights.next();
        }
        if a.is_none() && b.is_none() {
            break;
        }
        let Step { out, left, right } = step(a.take(), b.take())?;
        if let Some(op) = out {
            assem.append(op);
        }
        a = left;
        b = right;
    }
    Ok(assem)
}

fn nonzero(op: Op) -> Option<Op> {
    (op.chars > 0).then_some(op)
}

/// Apply `cs_op` to `att_op`, where `att_op` comes from an attribution string
/// or the earlier of two changesets and `cs_op` from the later one.
pub(crate) fn slice_zip(
    att_op: Option<Op>,
    cs_op: Option<Op>,
    pool: &AttributePool,
) -> Result<Step> {
    let (mut att, mut cs) = match (att_op, cs_op) {
        (None, cs) => return Ok(Step { out: cs, ..Step::default() }),
        (att, None) => return Ok(Step { out: att, ..Step::default() }),
        (Some(att), cs) if att.kind == OpKind::Remove => {
            return Ok(Step { out: Some(att), left: None, right: cs });
        }
        (att, Some(cs)) if cs.kind == OpKind::Insert => {
            return Ok(Step { out: Some(cs), left: att, right: None });
        }
        (Some(att), Some(cs)) => (att, cs),
    };

    let lines_consistent = match att.chars.cmp(&cs.chars) {
        std::cmp::Ordering::Less => att.lines <= cs.lines,
        std::cmp::Ordering::Greater => att.lines >= cs.lines,
        std::cmp::Ordering::Equal => att.lines == cs.lines,
    };
    if !lines_consistent {
        return Err(Error::invalid(format!(
            "line count mismatch when composing: {att} vs {cs}"
        )));
    }

    let kind = match (att.kind, cs.kind) {
        // The remove cancels (some of) the insert.
        (OpKind::Insert, OpKind::Remove) => None,
        (OpKind::Insert, OpKind::Keep) => Some(OpKind::Insert),
        (OpKind::Keep, OpKind::Remove) => Some(OpKind::Remove),
        (OpKind::Keep, OpKind::Keep) => Some(OpKind::Keep),
        (kind1, kind2) => {
            return Err(Error::invalid(format!(
                "unexpected ops {} and {} when composing",
                kind1.symbol(),
                kind2.symbol()
            )));
        }
    };
    let (chars, lines) = if att.chars <= cs.chars {
        (att.chars, att.lines)
    } else {
        (cs.chars, cs.lines)
    };
    // Removes keep their own attributes.
    let attribs = if cs.kind == OpKind::Remove {
        cs.attribs.clone()
    } else {
        compose_attributes(&att.attribs, &cs.attribs, att.kind == OpKind::Keep, pool)?
    };
    att.shrink(chars, lines)?;
    cs.shrink(chars, lines)?;
    Ok(Step {
        out: kind.map(|kind| Op {
            kind,
            chars,
            lines,
            attribs,
        }),
        left: nonzero(att),
        right: nonzero(cs),
    })
}

/// Compose `a` then `b` into a single changeset.
///
/// Fails with [`Error::LengthMismatch`] unless `a.new_len() == b.old_len()`.
pub fn compose(a: &Changeset, b: &Changeset, pool: &AttributePool) -> Result<Changeset> {
    if a.new_len() != b.old_len() {
        return Err(Error::LengthMismatch {
            what: "composed changeset",
            expected: a.new_len(),
            actual: b.old_len(),
        });
    }
    let mut bank1 = CharCursor::new(a.char_bank());
    let mut bank2 = CharCursor::new(b.char_bank());
    let mut bank = String::new();

    let assem = zip(a.ops().iter().cloned(), b.ops().iter().cloned(), |op1, op2| {
        let kind2 = op2.as_ref().map(|op| op.kind);
        if let (Some(ins), Some(rem)) = (&op1, &op2) {
            if ins.kind == OpKind::Insert && rem.kind == OpKind::Remove {
                bank1.skip(min(ins.chars, rem.chars)).ok_or_else(bank_exhausted)?;
            }
        }
        let step = slice_zip(op1, op2, pool)?;
        if let Some(op) = step.out.as_ref().filter(|op| op.kind == OpKind::Insert) {
            let source = if kind2 == Some(OpKind::Insert) {
                &mut bank2
            } else {
                &mut bank1
            };
            bank.push_str(source.take(op.chars).ok_or_else(bank_exhausted)?);
        }
        Ok(step)
    })?;

    Ok(Changeset::from_assembler(a.old_len(), b.new_len(), assem, bank))
}

fn bank_exhausted() -> Error {
    Error::invalid("char bank exhausted while composing")
}
