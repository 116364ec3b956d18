//! Operational transform.
//!
//! `follow(a, b)` rewrites `b` so it can be applied after `a`, where both
//! were made against the same document. Together with [`compose`] it
//! satisfies
//!
//! ```text
//! compose(a, follow(a, b, r)) == compose(b, follow(b, a, !r))
//! ```
//!
//! which is what lets every client converge on the server's text.
//!
//! [`compose`]: crate::compose

use crate::attribs::follow_attributes;
use crate::changeset::Changeset;
use crate::compose::{Step, zip};
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{Op, OpKind};
use crate::pool::{Attrib, AttribId, AttributePool};
use crate::splice::to_splices;

/// State carried across the zip steps of one `follow`.
struct Follower<'a> {
    chars1: CharCursor<'a>,
    chars2: CharCursor<'a>,
    /// Id of `insertorder:first`, if the pool has ever seen it.
    insert_first: Option<AttribId>,
    reverse_insert_order: bool,
    pool: &'a AttributePool,
    old_pos: usize,
    new_len: usize,
}

fn is_insert(op: &Option<Op>) -> bool {
    matches!(op, Some(op) if op.kind == OpKind::Insert)
}

impl Follower<'_> {
    fn has_insert_first(&self, op: &Op) -> bool {
        self.insert_first.is_some_and(|id| op.attribs.contains(id))
    }

    /// Whether `a`'s insert lands before `b`'s when both insert at the
    /// same position.
    fn a_inserts_first(&self, a: &Op, b: &Op) -> bool {
        let first1 = self.has_insert_first(a);
        let first2 = self.has_insert_first(b);
        if first1 != first2 {
            return first1;
        }
        // Text that does not start with a newline goes first, so lines
        // are not broken up.
        let newline1 = self.chars1.peek_char() == Some('\n');
        let newline2 = self.chars2.peek_char() == Some('\n');
        if newline1 != newline2 {
            return newline2;
        }
        !self.reverse_insert_order
    }

    /// `a`'s insert becomes a plain keep in the rewritten `b`.
    fn skip_a_insert(&mut self, a: Op, b: Option<Op>) -> Result<Step> {
        self.chars1.skip(a.chars).ok_or_else(bank_exhausted)?;
        Ok(Step {
            out: Some(Op::keep(a.chars, a.lines)),
            left: None,
            right: b,
        })
    }

    fn emit_b_insert(&mut self, a: Option<Op>, b: Op) -> Result<Step> {
        self.chars2.skip(b.chars).ok_or_else(bank_exhausted)?;
        Ok(Step {
            out: Some(b),
            left: a,
            right: None,
        })
    }

    fn step(&mut self, op1: Option<Op>, op2: Option<Op>) -> Result<Step> {
        let step = match (op1, op2) {
            (Some(a), Some(b)) if a.kind == OpKind::Insert && b.kind == OpKind::Insert => {
                if self.a_inserts_first(&a, &b) {
                    self.skip_a_insert(a, Some(b))?
                } else {
                    self.emit_b_insert(Some(a), b)?
                }
            }
            (Some(a), b) if a.kind == OpKind::Insert => self.skip_a_insert(a, b)?,
            (a, Some(b)) if b.kind == OpKind::Insert => self.emit_b_insert(a, b)?,
            // Text `a` removed is gone; whatever `b` did to it is moot.
            (Some(mut a), b) if a.kind == OpKind::Remove => match b {
                None => Step::default(),
                Some(mut b) => {
                    if a.chars <= b.chars {
                        b.shrink(a.chars, a.lines)?;
                        Step {
                            out: None,
                            left: None,
                            right: (b.chars > 0).then_some(b),
                        }
                    } else {
                        a.shrink(b.chars, b.lines)?;
                        Step {
                            out: None,
                            left: Some(a),
                            right: None,
                        }
                    }
                }
            },
            (a, Some(mut b)) if b.kind == OpKind::Remove => match a {
                None => Step {
                    out: Some(b),
                    left: None,
                    right: None,
                },
                Some(mut a) => {
                    if b.chars <= a.chars {
                        a.shrink(b.chars, b.lines)?;
                        Step {
                            out: Some(b),
                            left: (a.chars > 0).then_some(a),
                            right: None,
                        }
                    } else {
                        // Remove all of `a`'s keep and carry on.
                        let out = Op {
                            kind: OpKind::Remove,
                            chars: a.chars,
                            lines: a.lines,
                            attribs: b.attribs.clone(),
                        };
                        b.shrink(a.chars, a.lines)?;
                        Step {
                            out: Some(out),
                            left: None,
                            right: Some(b),
                        }
                    }
                }
            },
            (None, b) => Step {
                out: b,
                left: None,
                right: None,
            },
            // `a`'s trailing keeps must not leak its attributes into the result.
            (Some(_), None) => Step::default(),
            (Some(mut a), Some(mut b)) => {
                let attribs = follow_attributes(&a.attribs, &b.attribs, self.pool)?;
                let (chars, lines) = if a.chars <= b.chars {
                    (a.chars, a.lines)
                } else {
                    (b.chars, b.lines)
                };
                a.shrink(chars, lines)?;
                b.shrink(chars, lines)?;
                Step {
                    out: Some(Op::keep(chars, lines).with_attribs(attribs)),
                    left: (a.chars > 0).then_some(a),
                    right: (b.chars > 0).then_some(b),
                }
            }
        };
        if let Some(op) = &step.out {
            match op.kind {
                OpKind::Keep => {
                    self.old_pos += op.chars;
                    self.new_len += op.chars;
                }
                OpKind::Remove => self.old_pos += op.chars,
                OpKind::Insert => self.new_len += op.chars,
            }
        }
        Ok(step)
    }
}

fn bank_exhausted() -> Error {
    Error::invalid("char bank exhausted while transforming")
}

/// Rewrite `b` to apply after `a`; both must share the same old length.
///
/// When both insert at the same position the tie is broken by, in order: an
/// `insertorder:first` attribute; text not starting with a newline; and
/// finally `reverse_insert_order` (`false` puts `a`'s text first).
pub fn follow(
    a: &Changeset,
    b: &Changeset,
    reverse_insert_order: bool,
    pool: &AttributePool,
) -> Result<Changeset> {
    if a.old_len() != b.old_len() {
        return Err(Error::LengthMismatch {
            what: "followed changeset",
            expected: a.old_len(),
            actual: b.old_len(),
        });
    }
    let mut follower = Follower {
        chars1: CharCursor::new(a.char_bank()),
        chars2: CharCursor::new(b.char_bank()),
        insert_first: pool.lookup(&Attrib::new("insertorder", "first")),
        reverse_insert_order,
        pool,
        old_pos: 0,
        new_len: 0,
    };
    let assem = zip(a.ops().iter().cloned(), b.ops().iter().cloned(), |op1, op2| {
        follower.step(op1, op2)
    })?;
    let old_len = a.new_len();
    let new_len = follower.new_len + (old_len - follower.old_pos);
    Ok(Changeset::from_assembler(old_len, new_len, assem, b.char_bank().to_owned()))
}

/// Move the selection `[start, end)` through `cs`.
///
/// With `insertions_after` set, text inserted exactly at a collapsed or
/// replaced selection lands after it instead of before.
pub fn character_range_follow(
    cs: &Changeset,
    start: usize,
    end: usize,
    insertions_after: bool,
) -> (usize, usize) {
    let mut new_start = start as isize;
    let mut new_end = end as isize;
    let mut length_change_so_far = 0isize;
    for splice in to_splices(cs) {
        let splice_start = splice.start as isize + length_change_so_far;
        let splice_end = splice.end as isize + length_change_so_far;
        let new_text_len = splice.text.chars().count() as isize;
        let this_length_change = new_text_len - (splice_end - splice_start);

        if splice_start <= new_start && splice_end >= new_end {
            // Splice covers the whole range, or inserts at a collapsed one.
            if insertions_after {
                new_start = splice_start;
            } else {
                new_start = splice_start + new_text_len;
            }
            new_end = new_start;
        } else if splice_end <= new_start {
            new_start += this_length_change;
            new_end += this_length_change;
        } else if splice_start >= new_end {
            // After the range.
        } else if splice_start >= new_start && splice_end <= new_end {
            new_end += this_length_change;
        } else if splice_end < new_end {
            // Overlaps the beginning of the range.
            new_start = splice_start + new_text_len;
            new_end += this_length_change;
        } else {
            // Overlaps the end of the range.
            new_end = splice_start;
        }
        length_change_so_far += this_length_change;
    }
    (new_start.max(0) as usize, new_end.max(0) as usize)
}
