//! Incremental changeset construction.

use crate::assembler::SmartAssembler;
use crate::attribs::AttribSet;
use crate::changeset::Changeset;
use crate::error::Result;
use crate::op::{Op, OpKind, ops_from_text};

/// Builds a changeset against a document of known length, left to right.
///
/// ```
/// use padsync::Builder;
///
/// let cs = Builder::new(6).keep(1, 0).insert("X").to_changeset().unwrap();
/// assert_eq!(cs.to_string(), "Z:6>1=1+1$X");
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    old_len: usize,
    assem: SmartAssembler,
    char_bank: String,
}

impl Builder {
    pub fn new(old_len: usize) -> Builder {
        Builder {
            old_len,
            assem: SmartAssembler::new(),
            char_bank: String::new(),
        }
    }

    /// Keep `chars` characters, `lines` of which are newlines.
    pub fn keep(&mut self, chars: usize, lines: usize) -> &mut Self {
        self.assem.append(Op::keep(chars, lines));
        self
    }

    /// Keep characters while applying an attribute change to them.
    pub fn keep_with(&mut self, chars: usize, lines: usize, attribs: AttribSet) -> &mut Self {
        self.assem.append(Op::keep(chars, lines).with_attribs(attribs));
        self
    }

    /// Keep exactly the characters of `text`, which must match the document.
    pub fn keep_text(&mut self, text: &str, attribs: AttribSet) -> &mut Self {
        for op in ops_from_text(OpKind::Keep, text, &attribs) {
            self.assem.append(op);
        }
        self
    }

    pub fn insert(&mut self, text: &str) -> &mut Self {
        self.insert_with(text, AttribSet::new())
    }

    pub fn insert_with(&mut self, text: &str, attribs: AttribSet) -> &mut Self {
        for op in ops_from_text(OpKind::Insert, text, &attribs) {
            self.assem.append(op);
        }
        self.char_bank.push_str(text);
        self
    }

    pub fn remove(&mut self, chars: usize, lines: usize) -> &mut Self {
        self.assem.append(Op::remove(chars, lines));
        self
    }

    /// Finish the changeset. Fails if the ops do not fit `old_len`.
    pub fn to_changeset(&self) -> Result<Changeset> {
        Changeset::new(self.old_len, self.assem.clone().into_ops(), self.char_bank.clone())
    }
}
