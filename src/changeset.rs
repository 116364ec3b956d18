//! Changesets and their wire format.
//!
//! `Z:<oldLen>(>|<)<|newLen - oldLen|><ops>$<charBank>`, numbers in base 36.
//! A changeset is validated when it is built or parsed and is immutable
//! afterwards; every constructor canonicalizes its ops.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::assembler::SmartAssembler;
use crate::base36;
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{Op, OpIter, OpKind};
use crate::pool::AttribId;

/// An edit from a document of `old_len` chars to one of `new_len` chars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changeset {
    old_len: usize,
    new_len: usize,
    ops: Vec<Op>,
    char_bank: String,
}

impl Changeset {
    /// Build a changeset from loosely ordered ops, canonicalizing them and
    /// deriving the new length.
    pub fn new(
        old_len: usize,
        ops: impl IntoIterator<Item = Op>,
        char_bank: impl Into<String>,
    ) -> Result<Changeset> {
        let mut assem = SmartAssembler::new();
        for op in ops {
            assem.append(op);
        }
        assem.end_document();
        let new_len = old_len
            .checked_add_signed(assem.length_change())
            .ok_or_else(|| Error::invalid("changeset removes more than the document holds"))?;
        let cs = Changeset {
            old_len,
            new_len,
            ops: assem.into_ops(),
            char_bank: char_bank.into(),
        };
        cs.validate()?;
        Ok(cs)
    }

    /// Assemble the output of an algorithm whose lengths are already known.
    pub(crate) fn from_assembler(
        old_len: usize,
        new_len: usize,
        mut assem: SmartAssembler,
        char_bank: String,
    ) -> Changeset {
        assem.end_document();
        let cs = Changeset {
            old_len,
            new_len,
            ops: assem.into_ops(),
            char_bank,
        };
        debug_assert!(cs.validate().is_ok(), "assembled invalid changeset {cs}");
        cs
    }

    /// The changeset that leaves a document of `len` chars untouched.
    pub fn identity(len: usize) -> Changeset {
        Changeset {
            old_len: len,
            new_len: len,
            ops: Vec::new(),
            char_bank: String::new(),
        }
    }

    #[inline]
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    #[inline]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Explicit ops; the trailing unattributed keep is implicit.
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    #[inline]
    pub fn char_bank(&self) -> &str {
        &self.char_bank
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty() && self.old_len == self.new_len
    }

    /// Every attribute id referenced by any op.
    pub fn attrib_ids(&self) -> impl Iterator<Item = AttribId> + '_ {
        self.ops.iter().flat_map(|op| op.attribs.iter())
    }

    /// Parse and additionally require `s` to already be in canonical form,
    /// as every changeset arriving from a client must be.
    pub fn check_rep(s: &str) -> Result<Changeset> {
        let cs: Changeset = s.parse()?;
        if cs.to_string() != s {
            return Err(Error::invalid("not in canonical form"));
        }
        Ok(cs)
    }

    /// Check the length and char-bank invariants.
    fn validate(&self) -> Result<()> {
        let mut bank = CharCursor::new(&self.char_bank);
        let mut old_pos = 0usize;
        let mut new_pos = 0usize;
        for op in &self.ops {
            if op.lines > op.chars {
                return Err(Error::invalid(format!("op has more newlines than chars: {op}")));
            }
            match op.kind {
                OpKind::Keep => {
                    old_pos += op.chars;
                    new_pos += op.chars;
                }
                OpKind::Remove => old_pos += op.chars,
                OpKind::Insert => {
                    let text = bank
                        .take(op.chars)
                        .ok_or_else(|| Error::invalid("not enough chars in charBank"))?;
                    if text.matches('\n').count() != op.lines {
                        return Err(Error::invalid(
                            "number of newlines in insert op does not match the charBank",
                        ));
                    }
                    if op.lines > 0 && !text.ends_with('\n') {
                        return Err(Error::invalid(
                            "multiline insert op does not end with a newline",
                        ));
                    }
                    new_pos += op.chars;
                }
            }
            if old_pos > self.old_len {
                return Err(Error::LengthMismatch {
                    what: "changeset old",
                    expected: self.old_len,
                    actual: old_pos,
                });
            }
        }
        let new_len = new_pos + (self.old_len - old_pos);
        if new_len != self.new_len {
            return Err(Error::LengthMismatch {
                what: "changeset new",
                expected: self.new_len,
                actual: new_len,
            });
        }
        if !bank.is_empty() {
            return Err(Error::invalid("excess characters in the charBank"));
        }
        Ok(())
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Z:")?;
        base36::write(f, self.old_len)?;
        if self.new_len >= self.old_len {
            f.write_str(">")?;
            base36::write(f, self.new_len - self.old_len)?;
        } else {
            f.write_str("<")?;
            base36::write(f, self.old_len - self.new_len)?;
        }
        for op in &self.ops {
            write!(f, "{op}")?;
        }
        write!(f, "${}", self.char_bank)
    }
}

/// Read a base-36 number starting at `pos`, returning it and the end offset.
fn header_number(s: &str, pos: usize) -> Result<(usize, usize)> {
    let bytes = s.as_bytes();
    if pos > bytes.len() {
        return Err(Error::parse(bytes.len(), "truncated header"));
    }
    let mut end = pos;
    while end < bytes.len() && base36::is_digit(bytes[end]) {
        end += 1;
    }
    let n = base36::decode(&s[pos..end])
        .ok_or_else(|| Error::parse(pos, "expected a base-36 number"))?;
    Ok((n, end))
}

impl FromStr for Changeset {
    type Err = Error;

    /// Parse, validate and canonicalize a changeset.
    fn from_str(s: &str) -> Result<Changeset> {
        if !s.starts_with("Z:") {
            return Err(Error::parse(0, "not a changeset: missing 'Z:' header"));
        }
        let (old_len, pos) = header_number(s, 2)?;
        let grows = match s.as_bytes().get(pos) {
            Some(b'>') => true,
            Some(b'<') => false,
            _ => return Err(Error::parse(pos, "expected '>' or '<'")),
        };
        let (magnitude, ops_start) = header_number(s, pos + 1)?;
        let new_len = if grows {
            old_len.checked_add(magnitude)
        } else {
            old_len.checked_sub(magnitude)
        }
        .ok_or_else(|| Error::parse(pos, "length change out of range"))?;

        let body = &s[ops_start..];
        let mut iter = OpIter::new(body);
        let mut assem = SmartAssembler::new();
        for op in iter.by_ref() {
            let op = op.map_err(|e| match e {
                Error::Parse { offset, message } => Error::Parse {
                    offset: offset + ops_start,
                    message,
                },
                other => other,
            })?;
            assem.append(op);
        }
        let dollar = ops_start + iter.position();
        if s.as_bytes().get(dollar) != Some(&b'$') {
            return Err(Error::parse(dollar, "missing '$' before the char bank"));
        }
        assem.end_document();
        let cs = Changeset {
            old_len,
            new_len,
            ops: assem.into_ops(),
            char_bank: s[dollar + 1..].to_owned(),
        };
        cs.validate()?;
        Ok(cs)
    }
}

impl Serialize for Changeset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Changeset {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Changeset, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
