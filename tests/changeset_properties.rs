//! Property-based tests for changeset composition and transformation.

use padsync::{
    AText, Attrib, AttribSet, AttributePool, Builder, Changeset, LineIndex, apply_to_atext,
    apply_to_text, compose, follow, make_splice,
};
use proptest::prelude::*;

// =============================================================================
// Test helpers
// =============================================================================

/// Attributes the generated edits draw from. Index 0 is a clear instruction
/// and only ever appears on keeps.
const ATTRIBS: [(&str, &str); 4] =
    [("bold", ""), ("bold", "true"), ("author", "a"), ("author", "b")];

/// One edit, with positions given as fractions of the text length.
#[derive(Clone, Debug)]
enum Edit {
    Splice {
        pos_pct: f64,
        del: usize,
        ins: String,
        attrib: Option<usize>,
    },
    Format {
        pos_pct: f64,
        len: usize,
        attrib: usize,
    },
}

fn attrib_pool() -> AttributePool {
    let mut pool = AttributePool::new();
    for (key, value) in ATTRIBS {
        pool.put(Attrib::new(key, value));
    }
    pool
}

fn attrib_set(pool: &AttributePool, choice: Option<usize>) -> AttribSet {
    choice
        .and_then(|i| pool.lookup(&Attrib::new(ATTRIBS[i].0, ATTRIBS[i].1)))
        .map(|id| AttribSet::from_ids([id]))
        .unwrap_or_default()
}

fn arbitrary_text() -> impl Strategy<Value = String> {
    "[ab\n]{0,24}".prop_map(|s| format!("{s}\n"))
}

fn arbitrary_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (0.0..=1.0f64, 0..6usize, "[xy\n]{0,5}", prop::option::of(1..4usize))
            .prop_map(|(pos_pct, del, ins, attrib)| Edit::Splice { pos_pct, del, ins, attrib }),
        1 => (0.0..=1.0f64, 0..8usize, 0..4usize)
            .prop_map(|(pos_pct, len, attrib)| Edit::Format { pos_pct, len, attrib }),
    ]
}

fn arbitrary_edits() -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(arbitrary_edit(), 1..5)
}

fn edit_changeset(current: &str, edit: &Edit, pool: &AttributePool) -> Changeset {
    let len = current.chars().count();
    match edit {
        Edit::Splice { pos_pct, del, ins, attrib } => {
            let start = (pos_pct * len as f64) as usize;
            make_splice(current, start, *del, ins, attrib_set(pool, *attrib)).unwrap()
        }
        Edit::Format { pos_pct, len: span, attrib } => {
            let start = ((pos_pct * len as f64) as usize).min(len);
            let end = (start + span).min(len);
            let before: String = current.chars().take(start).collect();
            let range: String = current.chars().skip(start).take(end - start).collect();
            Builder::new(len)
                .keep_text(&before, AttribSet::new())
                .keep_text(&range, attrib_set(pool, Some(*attrib)))
                .to_changeset()
                .unwrap()
        }
    }
}

/// Fold `edits` into a single changeset from `text`, returning it and the new text.
fn changeset_for(text: &str, edits: &[Edit], pool: &AttributePool) -> (Changeset, String) {
    let mut cs = Changeset::identity(text.chars().count());
    let mut current = text.to_owned();
    for edit in edits {
        let step = edit_changeset(&current, edit, pool);
        current = apply_to_text(&step, &current).unwrap();
        cs = compose(&cs, &step, pool).unwrap();
    }
    (cs, current)
}

// =============================================================================
// Codec properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn serialized_form_round_trips(text in arbitrary_text(), edits in arbitrary_edits()) {
        let pool = attrib_pool();
        let (cs, _) = changeset_for(&text, &edits, &pool);
        let serialized = cs.to_string();
        let parsed: Changeset = serialized.parse().unwrap();
        prop_assert_eq!(&parsed, &cs);
        prop_assert!(Changeset::check_rep(&serialized).is_ok());
    }

    #[test]
    fn lengths_match_texts(text in arbitrary_text(), edits in arbitrary_edits()) {
        let pool = attrib_pool();
        let (cs, result) = changeset_for(&text, &edits, &pool);
        prop_assert_eq!(cs.old_len(), text.chars().count());
        prop_assert_eq!(cs.new_len(), result.chars().count());
        prop_assert_eq!(apply_to_text(&cs, &text).unwrap(), result);
    }
}

// =============================================================================
// Compose properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn compose_with_identity_changes_nothing(text in arbitrary_text(), edits in arbitrary_edits()) {
        let pool = attrib_pool();
        let (cs, _) = changeset_for(&text, &edits, &pool);
        let before = Changeset::identity(cs.old_len());
        let after = Changeset::identity(cs.new_len());
        prop_assert_eq!(&compose(&before, &cs, &pool).unwrap(), &cs);
        prop_assert_eq!(&compose(&cs, &after, &pool).unwrap(), &cs);
    }

    #[test]
    fn compose_is_associative(
        text in arbitrary_text(),
        a in arbitrary_edits(),
        b in arbitrary_edits(),
        c in arbitrary_edits(),
    ) {
        let pool = attrib_pool();
        let (ca, ta) = changeset_for(&text, &a, &pool);
        let (cb, tb) = changeset_for(&ta, &b, &pool);
        let (cc, tc) = changeset_for(&tb, &c, &pool);

        let left = compose(&compose(&ca, &cb, &pool).unwrap(), &cc, &pool).unwrap();
        let right = compose(&ca, &compose(&cb, &cc, &pool).unwrap(), &pool).unwrap();
        prop_assert_eq!(&left, &right);
        prop_assert_eq!(apply_to_text(&left, &text).unwrap(), tc);
    }

    #[test]
    fn composition_applies_like_its_parts(
        text in arbitrary_text(),
        a in arbitrary_edits(),
        b in arbitrary_edits(),
    ) {
        let pool = attrib_pool();
        let base = AText::new(text);
        let (ca, ta) = changeset_for(&base.text, &a, &pool);
        let (cb, _) = changeset_for(&ta, &b, &pool);

        let middle = apply_to_atext(&ca, &base, &pool).unwrap();
        let stepwise = apply_to_atext(&cb, &middle, &pool).unwrap();
        let composed = apply_to_atext(&compose(&ca, &cb, &pool).unwrap(), &base, &pool).unwrap();
        prop_assert_eq!(stepwise, composed);
    }
}

// =============================================================================
// Follow properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn concurrent_edits_converge(
        text in arbitrary_text(),
        a in arbitrary_edits(),
        b in arbitrary_edits(),
    ) {
        let pool = attrib_pool();
        let base = AText::new(text);
        let (ca, _) = changeset_for(&base.text, &a, &pool);
        let (cb, _) = changeset_for(&base.text, &b, &pool);

        let a_then_b = follow(&ca, &cb, false, &pool).unwrap();
        let b_then_a = follow(&cb, &ca, true, &pool).unwrap();
        prop_assert_eq!(a_then_b.old_len(), ca.new_len());
        prop_assert_eq!(b_then_a.old_len(), cb.new_len());

        let left = apply_to_atext(&ca, &base, &pool).unwrap();
        let left = apply_to_atext(&a_then_b, &left, &pool).unwrap();
        let right = apply_to_atext(&cb, &base, &pool).unwrap();
        let right = apply_to_atext(&b_then_a, &right, &pool).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn following_identity_changes_nothing(text in arbitrary_text(), edits in arbitrary_edits()) {
        let pool = attrib_pool();
        let (cs, _) = changeset_for(&text, &edits, &pool);
        let id = Changeset::identity(cs.old_len());
        prop_assert_eq!(follow(&id, &cs, false, &pool).unwrap(), cs.clone());
        prop_assert!(follow(&cs, &id, false, &pool).unwrap().is_identity());
    }
}

// =============================================================================
// Line index
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn line_index_tracks_text(
        text in arbitrary_text(),
        rounds in prop::collection::vec(arbitrary_edits(), 1..4),
    ) {
        let pool = attrib_pool();
        let mut index = LineIndex::new(&text);
        let mut current = text;
        for edits in &rounds {
            let (cs, next) = changeset_for(&current, edits, &pool);
            index.apply(&cs).unwrap();
            current = next;
            prop_assert_eq!(index.text(), current.clone());
            prop_assert_eq!(index.len(), current.chars().count());
            prop_assert_eq!(index.line_count(), current.split_inclusive('\n').count());
        }
    }
}

// =============================================================================
// Attributed text
// =============================================================================

#[test]
fn authorship_survives_concurrent_inserts() {
    let mut pool = AttributePool::new();
    let base = AText::new("hello");
    let by_a = AttribSet::for_insert([Attrib::new("author", "a")], &mut pool);
    let by_b = AttribSet::for_insert([Attrib::new("author", "b")], &mut pool);
    let ca = Builder::new(6).keep(2, 0).insert_with("AA", by_a).to_changeset().unwrap();
    let cb = Builder::new(6).keep(2, 0).insert_with("B", by_b).to_changeset().unwrap();

    let left = apply_to_atext(&ca, &base, &pool).unwrap();
    let left = apply_to_atext(&follow(&ca, &cb, false, &pool).unwrap(), &left, &pool).unwrap();
    let right = apply_to_atext(&cb, &base, &pool).unwrap();
    let right = apply_to_atext(&follow(&cb, &ca, true, &pool).unwrap(), &right, &pool).unwrap();

    assert_eq!(left, right);
    assert_eq!(left.text, "heAABllo\n");
    assert_eq!(left.attribs, "+2*0+2*1+1|1+4");
}

#[test]
fn conflicting_formatting_converges() {
    let pool = attrib_pool();
    let base = AText::new("abcd");
    let bold = attrib_set(&pool, Some(1));
    let clear = attrib_set(&pool, Some(0));
    let ca = Builder::new(5).keep(1, 0).keep_with(2, 0, bold).to_changeset().unwrap();
    let cb = Builder::new(5).keep_with(3, 0, clear).to_changeset().unwrap();

    let left = apply_to_atext(&ca, &base, &pool).unwrap();
    let left = apply_to_atext(&follow(&ca, &cb, false, &pool).unwrap(), &left, &pool).unwrap();
    let right = apply_to_atext(&cb, &base, &pool).unwrap();
    let right = apply_to_atext(&follow(&cb, &ca, true, &pool).unwrap(), &right, &pool).unwrap();

    // The clear has the smaller value, so it wins both ways.
    assert_eq!(left, right);
    assert_eq!(left.attribs, "|1+5");
}
