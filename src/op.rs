//! Ops and the op-string parser.
//!
//! An op-string is a run of records of the form
//! `(*attrib)* (|lines)? (=|-|+) chars`, every number in base 36,
//! terminated by `$` (or the end of the input for attribution strings).

use std::fmt;

use crate::attribs::AttribSet;
use crate::base36;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Copy characters from the old text, optionally changing their attributes.
    Keep,
    /// Drop characters from the old text.
    Remove,
    /// Insert characters taken from the char bank.
    Insert,
}

impl OpKind {
    pub fn symbol(self) -> char {
        match self {
            OpKind::Keep => '=',
            OpKind::Remove => '-',
            OpKind::Insert => '+',
        }
    }

    pub fn from_symbol(c: u8) -> Option<OpKind> {
        match c {
            b'=' => Some(OpKind::Keep),
            b'-' => Some(OpKind::Remove),
            b'+' => Some(OpKind::Insert),
            _ => None,
        }
    }
}

/// A single changeset operation over `chars` characters, `lines` of which
/// are newlines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Op {
    pub kind: OpKind,
    pub chars: usize,
    pub lines: usize,
    pub attribs: AttribSet,
}

impl Op {
    pub fn new(kind: OpKind, chars: usize, lines: usize) -> Op {
        Op {
            kind,
            chars,
            lines,
            attribs: AttribSet::new(),
        }
    }

    pub fn keep(chars: usize, lines: usize) -> Op {
        Op::new(OpKind::Keep, chars, lines)
    }

    pub fn remove(chars: usize, lines: usize) -> Op {
        Op::new(OpKind::Remove, chars, lines)
    }

    pub fn insert(chars: usize, lines: usize) -> Op {
        Op::new(OpKind::Insert, chars, lines)
    }

    pub fn with_attribs(mut self, attribs: AttribSet) -> Op {
        self.attribs = attribs;
        self
    }

    /// Consume a prefix of this op. Fails if the prefix claims more
    /// characters or newlines than the op has.
    pub(crate) fn shrink(&mut self, chars: usize, lines: usize) -> Result<()> {
        match (self.chars.checked_sub(chars), self.lines.checked_sub(lines)) {
            (Some(c), Some(l)) => {
                self.chars = c;
                self.lines = l;
                Ok(())
            }
            _ => Err(Error::invalid(format!(
                "line count mismatch: cannot take {chars} chars / {lines} lines from {self}"
            ))),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attribs)?;
        if self.lines > 0 {
            f.write_str("|")?;
            base36::write(f, self.lines)?;
        }
        write!(f, "{}", self.kind.symbol())?;
        base36::write(f, self.chars)
    }
}

/// Serialize a run of ops back to op-string form.
pub fn write_ops(ops: &[Op]) -> String {
    let mut out = String::new();
    for op in ops {
        // Formatting into a String cannot fail.
        let _ = fmt::Write::write_fmt(&mut out, format_args!("{op}"));
    }
    out
}

/// Split `text` into at most two ops of `kind`: one through the last
/// newline and one for the newline-free tail.
pub fn ops_from_text(kind: OpKind, text: &str, attribs: &AttribSet) -> impl Iterator<Item = Op> {
    let (head, tail) = match text.rfind('\n') {
        Some(i) => text.split_at(i + 1),
        None => ("", text),
    };
    let head = Op {
        kind,
        chars: head.chars().count(),
        lines: head.matches('\n').count(),
        attribs: attribs.clone(),
    };
    let tail = Op {
        kind,
        chars: tail.chars().count(),
        lines: 0,
        attribs: attribs.clone(),
    };
    [head, tail].into_iter().filter(|op| op.chars > 0)
}

/// Lazy, forward-only parser over an op-string.
///
/// Yields `Err` once and then stops on the first malformed record.
pub struct OpIter<'a> {
    src: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> OpIter<'a> {
    pub fn new(src: &'a str) -> OpIter<'a> {
        OpIter {
            src,
            pos: 0,
            done: false,
        }
    }

    pub fn has_next(&self) -> bool {
        !self.done && self.pos < self.src.len() && self.src.as_bytes()[self.pos] != b'$'
    }

    /// Byte offset of the next unread record.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn number(&mut self) -> Result<usize> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len() && base36::is_digit(bytes[self.pos]) {
            self.pos += 1;
        }
        base36::decode(&self.src[start..self.pos])
            .ok_or_else(|| Error::parse(start, "expected a base-36 number"))
    }

    fn parse_op(&mut self) -> Result<Op> {
        let bytes = self.src.as_bytes();
        let mut attribs = AttribSet::new();
        while self.pos < bytes.len() && bytes[self.pos] == b'*' {
            let marker = self.pos;
            self.pos += 1;
            let id = self.number()?;
            attribs.push_ascending(id, marker)?;
        }
        let mut lines = 0;
        if self.pos < bytes.len() && bytes[self.pos] == b'|' {
            self.pos += 1;
            lines = self.number()?;
        }
        let Some(symbol) = self.src[self.pos..].chars().next() else {
            return Err(Error::parse(self.pos, "truncated op"));
        };
        let kind = u8::try_from(symbol)
            .ok()
            .and_then(OpKind::from_symbol)
            .ok_or_else(|| Error::parse(self.pos, format!("invalid operation {symbol:?}")))?;
        self.pos += 1;
        let chars = self.number()?;
        Ok(Op {
            kind,
            chars,
            lines,
            attribs,
        })
    }
}

impl Iterator for OpIter<'_> {
    type Item = Result<Op>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            self.done = true;
            return None;
        }
        let op = self.parse_op();
        if op.is_err() {
            self.done = true;
        }
        Some(op)
    }
}

/// Parse a whole op-string (such as an attribution string) eagerly.
pub fn parse_ops(src: &str) -> Result<Vec<Op>> {
    let mut iter = OpIter::new(src);
    let ops = iter.by_ref().collect::<Result<Vec<_>>>()?;
    if iter.position() != src.len() {
        return Err(Error::parse(iter.position(), "unexpected '$' in op-string"));
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::AttribId;

    #[test]
    fn parses_records() {
        let ops: Vec<Op> = OpIter::new("*0*1|2=a-3+4$xyz")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].kind, OpKind::Keep);
        assert_eq!(ops[0].chars, 10);
        assert_eq!(ops[0].lines, 2);
        assert_eq!(
            ops[0].attribs,
            AttribSet::from_ids([AttribId(0), AttribId(1)])
        );
        assert_eq!(ops[1], Op::remove(3, 0));
        assert_eq!(ops[2], Op::insert(4, 0));
    }

    #[test]
    fn stops_at_dollar() {
        let mut iter = OpIter::new("+1$+2");
        assert!(iter.has_next());
        assert!(iter.next().unwrap().is_ok());
        assert!(!iter.has_next());
        assert!(iter.next().is_none());
    }

    #[test]
    fn rejects_unknown_operator() {
        let mut iter = OpIter::new("=1?2");
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(Error::Parse { offset: 2, .. }))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn reports_multibyte_operator() {
        let mut iter = OpIter::new("=1é2");
        assert!(iter.next().unwrap().is_ok());
        match iter.next() {
            Some(Err(Error::Parse { offset, message })) => {
                assert_eq!(offset, 2);
                assert_eq!(message, "invalid operation 'é'");
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_count_and_truncation() {
        assert!(OpIter::new("=").next().unwrap().is_err());
        assert!(OpIter::new("*0").next().unwrap().is_err());
        assert!(OpIter::new("|1").next().unwrap().is_err());
    }

    #[test]
    fn rejects_descending_attributes() {
        assert!(OpIter::new("*2*1+1").next().unwrap().is_err());
    }

    #[test]
    fn display_is_canonical() {
        let ops: Vec<Op> = OpIter::new("*00|01=0b").collect::<Result<_>>().unwrap();
        assert_eq!(write_ops(&ops), "*0|1=b");
    }

    #[test]
    fn ops_from_text_splits_at_last_newline() {
        let ops: Vec<Op> = ops_from_text(OpKind::Insert, "ab\ncd\nef", &AttribSet::new()).collect();
        assert_eq!(ops, vec![Op::insert(6, 2), Op::insert(2, 0)]);
        let ops: Vec<Op> = ops_from_text(OpKind::Keep, "abc", &AttribSet::new()).collect();
        assert_eq!(ops, vec![Op::keep(3, 0)]);
        assert_eq!(ops_from_text(OpKind::Remove, "", &AttribSet::new()).count(), 0);
    }

    #[test]
    fn parse_ops_rejects_trailing_bank() {
        assert!(parse_ops("+1|1+2").is_ok());
        assert!(parse_ops("+1$x").is_err());
    }
}
