//! Applying changesets to text and to attribution strings.

use serde::{Deserialize, Serialize};

use crate::changeset::Changeset;
use crate::compose::{slice_zip, zip};
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{OpKind, ops_from_text, parse_ops, write_ops};
use crate::pool::AttributePool;

/// Apply `cs` to `text`, which must be exactly `cs.old_len()` chars long.
///
/// Every kept or removed range must contain exactly as many newlines as its
/// op claims.
pub fn apply_to_text(cs: &Changeset, text: &str) -> Result<String> {
    let text_len = text.chars().count();
    if text_len != cs.old_len() {
        return Err(Error::LengthMismatch {
            what: "text",
            expected: cs.old_len(),
            actual: text_len,
        });
    }
    let mut src = CharCursor::new(text);
    let mut bank = CharCursor::new(cs.char_bank());
    let mut out = String::with_capacity(text.len() + cs.char_bank().len());
    for op in cs.ops() {
        match op.kind {
            OpKind::Keep | OpKind::Remove => {
                let span = src
                    .take(op.chars)
                    .ok_or_else(|| Error::invalid("op runs past the end of the text"))?;
                let lines = span.matches('\n').count();
                if lines != op.lines {
                    return Err(Error::invalid(format!(
                        "op {op} spans {lines} newlines in the text"
                    )));
                }
                if op.kind == OpKind::Keep {
                    out.push_str(span);
                }
            }
            OpKind::Insert => {
                let span = bank
                    .take(op.chars)
                    .ok_or_else(|| Error::invalid("not enough chars in charBank"))?;
                out.push_str(span);
            }
        }
    }
    out.push_str(src.rest());
    Ok(out)
}

/// Apply `cs` to an attribution string for the text `cs` was made against.
///
/// The attribution must consist of inserts covering exactly `cs.old_len()`
/// chars.
pub fn apply_to_attribution(
    cs: &Changeset,
    attribution: &str,
    pool: &AttributePool,
) -> Result<String> {
    let ops = parse_ops(attribution)?;
    let mut covered = 0;
    for op in &ops {
        if op.kind != OpKind::Insert {
            return Err(Error::invalid(format!("attribution string contains a non-insert op {op}")));
        }
        covered += op.chars;
    }
    if covered != cs.old_len() {
        return Err(Error::LengthMismatch {
            what: "attribution",
            expected: cs.old_len(),
            actual: covered,
        });
    }
    let assem = zip(ops, cs.ops().iter().cloned(), |att_op, cs_op| {
        slice_zip(att_op, cs_op, pool)
    })?;
    Ok(write_ops(&assem.into_ops()))
}

/// The attribution string for unformatted `text`.
pub fn make_attribution(text: &str) -> String {
    let ops: Vec<_> = ops_from_text(OpKind::Insert, text, &Default::default()).collect();
    write_ops(&ops)
}

/// Attributed text: a document together with the formatting of every char.
///
/// `attribs` is a sequence of insert ops covering `text` exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AText {
    pub text: String,
    pub attribs: String,
}

impl AText {
    /// Unformatted text. Documents end in a newline; add one if missing.
    pub fn new(text: impl Into<String>) -> AText {
        let mut text = text.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        let attribs = make_attribution(&text);
        AText { text, attribs }
    }

    /// Length of the text in chars.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Default for AText {
    fn default() -> AText {
        AText::new("\n")
    }
}

/// Apply `cs` to both halves of an [`AText`].
pub fn apply_to_atext(cs: &Changeset, atext: &AText, pool: &AttributePool) -> Result<AText> {
    Ok(AText {
        text: apply_to_text(cs, &atext.text)?,
        attribs: apply_to_attribution(cs, &atext.attribs, pool)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribs::AttribSet;
    use crate::builder::Builder;
    use crate::pool::Attrib;

    #[test]
    fn applies_hello_edit() {
        let cs: Changeset = "Z:6>1=1+1$X".parse().unwrap();
        assert_eq!(apply_to_text(&cs, "hello\n").unwrap(), "hXello\n");
    }

    #[test]
    fn applies_multiline_keep_and_remove() {
        let cs: Changeset = "Z:8<3|1=2-3$".parse().unwrap();
        assert_eq!(apply_to_text(&cs, "a\nbcd\ne\n").unwrap(), "a\n\ne\n");
    }

    #[test]
    fn rejects_wrong_length() {
        let cs: Changeset = "Z:6>1=1+1$X".parse().unwrap();
        assert!(matches!(
            apply_to_text(&cs, "hi\n"),
            Err(Error::LengthMismatch { expected: 6, actual: 3, .. })
        ));
    }

    #[test]
    fn rejects_newline_miscount() {
        let cs: Changeset = "Z:4<1|1=2-1$".parse().unwrap();
        assert!(apply_to_text(&cs, "abc\n").is_err());
    }

    #[test]
    fn counts_chars_not_bytes() {
        let cs: Changeset = "Z:3>1=1+1$ü".parse().unwrap();
        assert_eq!(apply_to_text(&cs, "éa\n").unwrap(), "éüa\n");
    }

    #[test]
    fn attribution_for_plain_text() {
        assert_eq!(make_attribution("ab\ncd\n"), "|2+6");
        assert_eq!(make_attribution("ab\ncd"), "|1+3+2");
        assert_eq!(make_attribution(""), "");
    }

    #[test]
    fn formats_text() {
        let mut pool = AttributePool::new();
        let bold = AttribSet::for_keep([Attrib::new("bold", "true")], &mut pool);
        let atext = AText::new("abc");
        let cs = Builder::new(4).keep(1, 0).keep_with(2, 0, bold).to_changeset().unwrap();
        let out = apply_to_atext(&cs, &atext, &pool).unwrap();
        assert_eq!(out.text, "abc\n");
        assert_eq!(out.attribs, "+1*0+2|1+1");
    }

    #[test]
    fn attribution_vectors() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("bold", ""));
        pool.put(Attrib::new("bold", "true"));
        let cases = [
            ("Z:7>3-1*0=1*1=1=3+4$abcd", "+1*1+1|1+5", "+1*1+1|1+8"),
            ("Z:5>0*1=2$", "+1|1+4", "*1+2|1+3"),
        ];
        for (cs, attribution, expected) in cases {
            let cs: Changeset = cs.parse().unwrap();
            assert_eq!(apply_to_attribution(&cs, attribution, &pool).unwrap(), expected, "{cs}");
        }
    }

    #[test]
    fn attribution_must_cover_the_old_text() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("bold", "true"));
        let cs: Changeset = "Z:5>0*0=3$".parse().unwrap();
        assert_eq!(apply_to_attribution(&cs, "+5", &pool).unwrap(), "*0+3+2");
        assert!(matches!(
            apply_to_attribution(&cs, "+2", &pool),
            Err(Error::LengthMismatch { expected: 5, actual: 2, .. })
        ));
        assert!(matches!(
            apply_to_attribution(&cs, "+9", &pool),
            Err(Error::LengthMismatch { expected: 5, actual: 9, .. })
        ));
    }

    #[test]
    fn attribution_holds_only_inserts() {
        let mut pool = AttributePool::new();
        pool.put(Attrib::new("bold", "true"));
        let cs: Changeset = "Z:5>0*0=3$".parse().unwrap();
        assert!(matches!(
            apply_to_attribution(&cs, "=5", &pool),
            Err(Error::InvalidChangeset(_))
        ));
        assert!(matches!(
            apply_to_attribution(&cs, "+3-2", &pool),
            Err(Error::InvalidChangeset(_))
        ));
    }

    #[test]
    fn atext_serializes_with_plain_fields() {
        let atext = AText::new("hi");
        let json = serde_json::to_string(&atext).unwrap();
        assert_eq!(json, r#"{"text":"hi\n","attribs":"|1+3"}"#);
    }
}
