//! Op assemblers.
//!
//! Every changeset produced by this crate goes through an assembler, which is
//! what makes the output canonical:
//! - adjacent ops with the same kind and attributes are merged
//! - zero-length ops are dropped
//! - a final keep without attributes is left implicit
//! - within a run of changes, removes come before inserts

use crate::op::{Op, OpKind};

/// Merges consecutive compatible ops. Does not reorder.
#[derive(Clone, Debug, Default)]
pub struct MergingAssembler {
    out: Vec<Op>,
    buf: Option<Op>,
    /// Newline-free chars held back after a multi-line `buf`. Given
    /// `[xxx\n, yyy]` they stay separate, but `[xxx\n, yyy, zzz\n]`
    /// becomes a single multi-line op.
    buf_tail_chars: usize,
}

impl MergingAssembler {
    pub fn new() -> MergingAssembler {
        MergingAssembler::default()
    }

    pub fn append(&mut self, op: Op) {
        if op.chars == 0 {
            return;
        }
        match &mut self.buf {
            Some(buf) if buf.kind == op.kind && buf.attribs == op.attribs => {
                if op.lines > 0 {
                    buf.chars += self.buf_tail_chars + op.chars;
                    buf.lines += op.lines;
                    self.buf_tail_chars = 0;
                } else if buf.lines == 0 {
                    buf.chars += op.chars;
                } else {
                    self.buf_tail_chars += op.chars;
                }
            }
            _ => {
                self.flush(false);
                self.buf = Some(op);
            }
        }
    }

    fn flush(&mut self, end_document: bool) {
        let Some(buf) = self.buf.take() else {
            return;
        };
        if end_document && buf.kind == OpKind::Keep && buf.attribs.is_empty() {
            self.buf_tail_chars = 0;
            return;
        }
        let tail = std::mem::take(&mut self.buf_tail_chars);
        if tail > 0 {
            let mut rest = buf.clone();
            rest.chars = tail;
            rest.lines = 0;
            self.out.push(buf);
            self.out.push(rest);
        } else {
            self.out.push(buf);
        }
    }

    /// Flush, dropping a trailing unattributed keep.
    pub fn end_document(&mut self) {
        self.flush(true);
    }

    /// Flush and hand out everything assembled so far.
    pub fn take(&mut self) -> Vec<Op> {
        self.flush(false);
        std::mem::take(&mut self.out)
    }

    pub fn clear(&mut self) {
        self.out.clear();
        self.buf = None;
        self.buf_tail_chars = 0;
    }
}

/// Assembler that also accepts loosely ordered input: interleaved removes and
/// inserts between two keeps are regrouped as all removes, then all inserts.
#[derive(Clone, Debug, Default)]
pub struct SmartAssembler {
    minus: MergingAssembler,
    plus: MergingAssembler,
    keep: MergingAssembler,
    out: Vec<Op>,
    last: Option<OpKind>,
    length_change: isize,
}

impl SmartAssembler {
    pub fn new() -> SmartAssembler {
        SmartAssembler::default()
    }

    fn flush_keeps(&mut self) {
        self.out.extend(self.keep.take());
    }

    fn flush_plus_minus(&mut self) {
        self.out.extend(self.minus.take());
        self.out.extend(self.plus.take());
    }

    pub fn append(&mut self, op: Op) {
        if op.chars == 0 {
            return;
        }
        let kind = op.kind;
        match kind {
            OpKind::Remove => {
                if self.last == Some(OpKind::Keep) {
                    self.flush_keeps();
                }
                self.length_change -= op.chars as isize;
                self.minus.append(op);
            }
            OpKind::Insert => {
                if self.last == Some(OpKind::Keep) {
                    self.flush_keeps();
                }
                self.length_change += op.chars as isize;
                self.plus.append(op);
            }
            OpKind::Keep => {
                if self.last != Some(OpKind::Keep) {
                    self.flush_plus_minus();
                }
                self.keep.append(op);
            }
        }
        self.last = Some(kind);
    }

    pub fn end_document(&mut self) {
        self.keep.end_document();
    }

    /// Net change in document length of everything appended.
    pub fn length_change(&self) -> isize {
        self.length_change
    }

    pub fn into_ops(mut self) -> Vec<Op> {
        self.flush_plus_minus();
        self.flush_keeps();
        self.out
    }

    pub fn clear(&mut self) {
        *self = SmartAssembler::default();
    }
}
