//! A document with its full revision history.
//!
//! A pad owns the attribute pool, the current attributed text and every
//! accepted changeset. Clients submit changesets made against some earlier
//! revision; the pad rebases them over everything accepted since, appends
//! them, and the result is what every other client must apply.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::apply::{AText, apply_to_atext, apply_to_text};
use crate::attribs::AttribSet;
use crate::changeset::Changeset;
use crate::error::{Error, Result};
use crate::follow::follow;
use crate::op::{OpKind, parse_ops};
use crate::pool::{Attrib, AttributePool};
use crate::splice::{make_splice, move_to_pool};

/// Every this many revisions the full text is stored alongside the changeset.
pub const KEY_REVISION_INTERVAL: usize = 100;

/// One accepted edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub changeset: Changeset,
    pub author: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Text after this revision, present on key revisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atext: Option<AText>,
}

/// Persisted form of a [`Pad`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PadSnapshot {
    pub pool: AttributePool,
    pub atext: AText,
    pub revisions: Vec<Revision>,
}

/// Outcome of [`Pad::check`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub revisions: usize,
    pub authors: BTreeSet<String>,
    pub text_len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "PadSnapshot", from = "PadSnapshot")]
pub struct Pad {
    pool: AttributePool,
    atext: AText,
    revisions: Vec<Revision>,
}

impl Pad {
    /// An empty pad: the text is a single newline and there are no revisions.
    pub fn new() -> Pad {
        Pad {
            pool: AttributePool::new(),
            atext: AText::default(),
            revisions: Vec::new(),
        }
    }

    /// A pad whose revision 0 inserts `text`.
    pub fn with_text(text: &str, author: &str, timestamp: u64) -> Result<Pad> {
        let mut pad = Pad::new();
        let cs = make_splice(&pad.atext.text, 0, 0, text, AttribSet::new())?;
        pad.append_revision(cs, author, timestamp)?;
        Ok(pad)
    }

    pub fn pool(&self) -> &AttributePool {
        &self.pool
    }

    pub fn atext(&self) -> &AText {
        &self.atext
    }

    pub fn text(&self) -> &str {
        &self.atext.text
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    /// Number of the latest revision, if there is one.
    pub fn head(&self) -> Option<usize> {
        self.revisions.len().checked_sub(1)
    }

    pub fn revision(&self, rev: usize) -> Result<&Revision> {
        self.revisions.get(rev).ok_or(Error::RevisionOutOfRange { rev, head: self.head() })
    }

    /// Revisions after `rev`, in order.
    pub fn revisions_since(&self, rev: usize) -> impl Iterator<Item = (usize, &Revision)> {
        self.revisions.iter().enumerate().skip(rev + 1)
    }

    /// Apply `cs` to the current text and record it as a new revision.
    ///
    /// A changeset that changes nothing is not recorded; the current head is
    /// returned instead.
    pub fn append_revision(
        &mut self,
        cs: Changeset,
        author: &str,
        timestamp: u64,
    ) -> Result<usize> {
        let atext = apply_to_atext(&cs, &self.atext, &self.pool)?;
        if let Some(head) = self.head() {
            if atext == self.atext {
                return Ok(head);
            }
        }
        if !author.is_empty() {
            self.pool.put(Attrib::new("author", author));
        }
        let rev = self.revisions.len();
        debug!(rev, author, old_len = cs.old_len(), new_len = cs.new_len(), "appending revision");
        let key = (rev % KEY_REVISION_INTERVAL == 0).then(|| atext.clone());
        self.revisions.push(Revision {
            changeset: cs,
            author: author.to_owned(),
            timestamp,
            atext: key,
        });
        self.atext = atext;
        Ok(rev)
    }

    /// Accept a changeset a client made against `base_rev`, with attribute
    /// ids from `wire_pool`.
    ///
    /// Returns the new revision number and the changeset as appended, rebased
    /// over every revision after `base_rev`.
    pub fn submit(
        &mut self,
        base_rev: usize,
        cs: &Changeset,
        wire_pool: &AttributePool,
        author: &str,
        timestamp: u64,
    ) -> Result<(usize, Changeset)> {
        let Some(head) = self.head().filter(|&head| base_rev <= head) else {
            return Err(Error::RevisionOutOfRange { rev: base_rev, head: self.head() });
        };
        for op in cs.ops() {
            for id in op.attribs.iter() {
                let attrib = wire_pool.require(id)?;
                let clears = op.kind == OpKind::Keep && attrib.value().is_empty();
                if attrib.key() == "author" && attrib.value() != author && !clears {
                    return Err(Error::AuthorMismatch {
                        expected: author.to_owned(),
                        found: attrib.value().to_owned(),
                    });
                }
            }
        }

        let mut rebased = move_to_pool(cs, wire_pool, &mut self.pool)?;
        for rev in base_rev + 1..=head {
            let revision = &self.revisions[rev];
            if revision.changeset == rebased && revision.author == author {
                // A retransmission of something already applied.
                rebased = Changeset::identity(rebased.old_len());
            }
            rebased = follow(&revision.changeset, &rebased, false, &self.pool)?;
        }
        let text_len = self.atext.len();
        if rebased.old_len() != text_len {
            return Err(Error::LengthMismatch {
                what: "rebased changeset",
                expected: text_len,
                actual: rebased.old_len(),
            });
        }
        debug!(base_rev, head, author, "rebased changeset");
        let rev = self.append_revision(rebased.clone(), author, timestamp)?;

        // The text must always end in a newline.
        if !self.atext.text.ends_with('\n') {
            let len = self.atext.len();
            let fix = make_splice(&self.atext.text, len, 0, "\n", AttribSet::new())?;
            self.append_revision(fix, "", timestamp)?;
        }
        Ok((rev, rebased))
    }

    /// The attributed text as of revision `rev`.
    pub fn atext_at(&self, rev: usize) -> Result<AText> {
        self.revision(rev)?;
        let key = rev - rev % KEY_REVISION_INTERVAL;
        let (mut atext, from) = match &self.revisions[key].atext {
            Some(atext) => (atext.clone(), key + 1),
            None => (AText::default(), 0),
        };
        for revision in &self.revisions[from..=rev] {
            atext = apply_to_atext(&revision.changeset, &atext, &self.pool)?;
        }
        Ok(atext)
    }

    /// Replay the whole history and verify it against the stored state.
    pub fn check(&self) -> Result<CheckReport> {
        self.pool.check()?;
        let mut atext = AText::default();
        let mut authors = BTreeSet::new();
        for (rev, revision) in self.revisions.iter().enumerate() {
            atext = self.check_revision(revision, &atext).map_err(|err| {
                warn!(rev, error = %err, "pad integrity check failed");
                err.at_revision(rev)
            })?;
            if !revision.author.is_empty() {
                authors.insert(revision.author.clone());
            }
        }
        if let Err(err) = self.check_final(&atext) {
            let rev = self.head().unwrap_or(0);
            warn!(rev, error = %err, "pad integrity check failed");
            return Err(err.at_revision(rev));
        }
        Ok(CheckReport {
            revisions: self.revisions.len(),
            authors,
            text_len: atext.len(),
        })
    }

    fn check_revision(&self, revision: &Revision, before: &AText) -> Result<AText> {
        let cs = &revision.changeset;
        for id in cs.attrib_ids() {
            self.pool.require(id)?;
        }
        if !revision.author.is_empty() {
            let attrib = Attrib::new("author", revision.author.as_str());
            if self.pool.lookup(&attrib).is_none() {
                return Err(Error::PoolInconsistency(format!(
                    "author {} is not in the pool",
                    revision.author
                )));
            }
        }
        // Checks the newline count of every op against the text.
        let text = apply_to_text(cs, &before.text)?;
        let after = apply_to_atext(cs, before, &self.pool)?;
        debug_assert_eq!(text, after.text);
        if let Some(stored) = &revision.atext {
            if *stored != after {
                return Err(Error::invalid(
                    "stored key revision text differs from the replayed text",
                ));
            }
        }
        Ok(after)
    }

    fn check_final(&self, replayed: &AText) -> Result<()> {
        for op in parse_ops(&self.atext.attribs)? {
            if op.kind != OpKind::Insert {
                return Err(Error::invalid("attribution string contains a non-insert op"));
            }
            for id in op.attribs.iter() {
                self.pool.require(id)?;
            }
        }
        if *replayed != self.atext {
            return Err(Error::invalid("replayed text differs from the stored text"));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PadSnapshot {
        PadSnapshot {
            pool: self.pool.clone(),
            atext: self.atext.clone(),
            revisions: self.revisions.clone(),
        }
    }

    /// Load a snapshot as is. Use [`Pad::check`] to validate it.
    pub fn from_snapshot(snapshot: PadSnapshot) -> Pad {
        Pad {
            pool: snapshot.pool,
            atext: snapshot.atext,
            revisions: snapshot.revisions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Pad> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for Pad {
    fn default() -> Pad {
        Pad::new()
    }
}

impl From<Pad> for PadSnapshot {
    fn from(pad: Pad) -> PadSnapshot {
        PadSnapshot {
            pool: pad.pool,
            atext: pad.atext,
            revisions: pad.revisions,
        }
    }
}

impl From<PadSnapshot> for Pad {
    fn from(snapshot: PadSnapshot) -> Pad {
        Pad::from_snapshot(snapshot)
    }
}
