//! Padsync - changesets for real-time collaborative text editing.
//!
//! A [`Changeset`] describes one edit of a document as a compact string,
//! `Z:<old len>(>|<)<delta><ops>$<inserted chars>`. Changesets can be
//! [composed](compose()) one after the other, [transformed](follow()) past
//! concurrent edits, and [applied](apply_to_text) to text and to the
//! per-character formatting of a document. A [`Pad`] keeps a document's
//! full history on the server side; a [`ChangesetTracker`] does the
//! bookkeeping for one client.
//!
//! # Quick Start
//!
//! ```
//! use padsync::{AttributePool, Builder, apply_to_text, compose, follow};
//!
//! let pool = AttributePool::new();
//! let x = Builder::new(6).keep(1, 0).insert("X").to_changeset().unwrap();
//! let y = Builder::new(6).keep(5, 0).insert("Y").to_changeset().unwrap();
//!
//! // Both edits were made against "hello\n"; rebase each past the other.
//! let left = compose(&x, &follow(&x, &y, false, &pool).unwrap(), &pool).unwrap();
//! let right = compose(&y, &follow(&y, &x, true, &pool).unwrap(), &pool).unwrap();
//! assert_eq!(apply_to_text(&left, "hello\n").unwrap(), "hXelloY\n");
//! assert_eq!(left, right);
//! ```

pub mod apply;
pub mod assembler;
pub mod attribs;
mod base36;
pub mod builder;
pub mod changeset;
pub mod compose;
mod cursor;
pub mod error;
pub mod follow;
pub mod lines;
pub mod op;
pub mod pad;
pub mod pool;
pub mod skip_list;
pub mod splice;
pub mod tracker;

pub use apply::{AText, apply_to_atext, apply_to_attribution, apply_to_text, make_attribution};
pub use attribs::{AttribSet, compose_attributes, follow_attributes};
pub use builder::Builder;
pub use changeset::Changeset;
pub use compose::compose;
pub use error::{Error, Result};
pub use follow::{character_range_follow, follow};
pub use lines::LineIndex;
pub use op::{Op, OpIter, OpKind};
pub use pad::{CheckReport, Pad, PadSnapshot, Revision};
pub use pool::{Attrib, AttribId, AttributePool};
pub use skip_list::{Entry, EntryKey, SkipList};
pub use splice::{Splice, make_splice, move_to_pool, prepare_for_wire, to_splices};
pub use tracker::ChangesetTracker;
