//! Client-side bookkeeping for one collaborating editor.
//!
//! The client's visible document is always `base`, then the changeset sent
//! to the server and not yet acknowledged (`in_flight`), then local edits not
//! yet sent (`pending`). Remote changes are merged into `base` and both
//! outstanding changesets are transformed past them.

use tracing::debug;

use crate::apply::{AText, apply_to_atext};
use crate::attribs::AttribSet;
use crate::changeset::Changeset;
use crate::compose::compose;
use crate::error::{Error, Result};
use crate::follow::follow;
use crate::op::OpKind;
use crate::pool::{Attrib, AttributePool};
use crate::splice::{move_attribution_to_pool, move_to_pool, prepare_for_wire};

#[derive(Clone, Debug)]
pub struct ChangesetTracker {
    author: String,
    pool: AttributePool,
    /// Latest text from the server.
    base: AText,
    in_flight: Option<Changeset>,
    pending: Changeset,
}

impl ChangesetTracker {
    pub fn new(author: impl Into<String>) -> ChangesetTracker {
        let base = AText::default();
        let pending = Changeset::identity(base.len());
        ChangesetTracker {
            author: author.into(),
            pool: AttributePool::new(),
            base,
            in_flight: None,
            pending,
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn pool(&self) -> &AttributePool {
        &self.pool
    }

    /// The local pool, for building attributed edits.
    pub fn pool_mut(&mut self) -> &mut AttributePool {
        &mut self.pool
    }

    pub fn base(&self) -> &AText {
        &self.base
    }

    /// Start over from server text whose attribute ids refer to `wire_pool`,
    /// discarding every outstanding change.
    pub fn set_base(&mut self, atext: &AText, wire_pool: &AttributePool) -> Result<()> {
        let attribs = move_attribution_to_pool(&atext.attribs, wire_pool, &mut self.pool)?;
        self.base = AText {
            text: atext.text.clone(),
            attribs,
        };
        self.in_flight = None;
        self.pending = Changeset::identity(self.base.len());
        Ok(())
    }

    /// Record an edit the user made to the visible document.
    pub fn local_edit(&mut self, cs: &Changeset) -> Result<()> {
        if cs.is_identity() {
            return Ok(());
        }
        self.pending = compose(&self.pending, cs, &self.pool)?;
        Ok(())
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.in_flight.is_some() || !self.pending.is_identity()
    }

    /// Move pending edits in flight and return them translated for the wire,
    /// or `None` if there is nothing to send.
    ///
    /// Calling this again before [`ack`](Self::ack) resends the old in-flight
    /// changeset merged with whatever was edited since.
    pub fn prepare_commit(&mut self) -> Result<Option<(Changeset, AttributePool)>> {
        let to_submit = match &self.in_flight {
            Some(in_flight) => compose(in_flight, &self.pending, &self.pool)?,
            None => {
                let claimed = self.claim_authorship(&self.pending.clone())?;
                if claimed.is_identity() {
                    self.pending = claimed;
                    return Ok(None);
                }
                claimed
            }
        };
        self.pending = Changeset::identity(to_submit.new_len());
        let wire = prepare_for_wire(&to_submit, &self.pool)?;
        debug!(
            author = %self.author,
            old_len = to_submit.old_len(),
            new_len = to_submit.new_len(),
            "committing"
        );
        self.in_flight = Some(to_submit);
        Ok(Some(wire))
    }

    /// Pasted text may carry other authors; inserts are credited to us.
    fn claim_authorship(&mut self, cs: &Changeset) -> Result<Changeset> {
        let mine = Attrib::new("author", self.author.as_str());
        let mut ops = Vec::with_capacity(cs.ops().len());
        for op in cs.ops() {
            let foreign = op.kind == OpKind::Insert
                && op
                    .attribs
                    .value_of("author", &self.pool)
                    .is_some_and(|author| author != self.author);
            if foreign {
                let attribs: AttribSet = op.attribs.with(mine.clone(), &mut self.pool);
                ops.push(op.clone().with_attribs(attribs));
            } else {
                ops.push(op.clone());
            }
        }
        Changeset::new(cs.old_len(), ops, cs.char_bank())
    }

    /// The server accepted the in-flight changeset.
    pub fn ack(&mut self) -> Result<()> {
        let Some(in_flight) = self.in_flight.take() else {
            return Err(Error::Protocol("acknowledged a commit that was never sent"));
        };
        self.base = apply_to_atext(&in_flight, &self.base, &self.pool)?;
        Ok(())
    }

    /// Merge a changeset made by somebody else, with ids from `wire_pool`.
    ///
    /// Returns the changeset to apply to the visible document.
    pub fn apply_remote(&mut self, cs: &Changeset, wire_pool: &AttributePool) -> Result<Changeset> {
        let cs = move_to_pool(cs, wire_pool, &mut self.pool)?;
        self.base = apply_to_atext(&cs, &self.base, &self.pool)?;

        let mut past_in_flight = cs.clone();
        if let Some(in_flight) = &self.in_flight {
            let rebased = follow(&cs, in_flight, false, &self.pool)?;
            past_in_flight = follow(in_flight, &cs, true, &self.pool)?;
            self.in_flight = Some(rebased);
        }
        // Remote text typed at the caret goes after the user's own.
        let pending = follow(&past_in_flight, &self.pending, true, &self.pool)?;
        let visible = follow(&self.pending, &past_in_flight, false, &self.pool)?;
        self.pending = pending;
        Ok(visible)
    }

    /// The visible document: base plus every outstanding change.
    pub fn document(&self) -> Result<AText> {
        let mut atext = self.base.clone();
        if let Some(in_flight) = &self.in_flight {
            atext = apply_to_atext(in_flight, &atext, &self.pool)?;
        }
        apply_to_atext(&self.pending, &atext, &self.pool)
    }
}
