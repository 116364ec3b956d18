//! Line-oriented views of a document.
//!
//! Editors keep a document as a list of lines. [`LineIndex`] keeps that list
//! in a [`SkipList`] keyed by stable line ids and weighted by line length, so
//! applying a changeset only rewrites the lines its splices touch.

use crate::assembler::MergingAssembler;
use crate::changeset::Changeset;
use crate::cursor::CharCursor;
use crate::error::{Error, Result};
use crate::op::{Op, parse_ops, write_ops};
use crate::skip_list::{Entry, EntryKey, SkipList};
use crate::splice::to_splices;

/// Split `text` after every newline. A final line without a newline is kept.
pub fn split_text_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Cut an attribution string into one attribution string per line of `text`.
pub fn split_attribution_lines(attribution: &str, text: &str) -> Result<Vec<String>> {
    let mut assem = MergingAssembler::new();
    let mut cursor = CharCursor::new(text);
    let mut lines = Vec::new();
    let mut append = |op: Op, lines: &mut Vec<String>| {
        let ends_line = op.lines > 0;
        assem.append(op);
        if ends_line {
            lines.push(write_ops(&assem.take()));
        }
    };
    let short = || Error::invalid("attribution runs past the end of the text");
    let miscount =
        |op: &Op| Error::invalid(format!("op {op} does not match the newlines in the text"));

    for op in parse_ops(attribution)? {
        let mut chars = op.chars;
        let mut newlines = op.lines;
        while newlines > 1 {
            let n = cursor.chars_through_newline().ok_or_else(short)?;
            if n > chars {
                return Err(miscount(&op));
            }
            cursor.skip(n).ok_or_else(short)?;
            append(Op { chars: n, lines: 1, ..op.clone() }, &mut lines);
            chars -= n;
            newlines -= 1;
        }
        let tail = cursor.take(chars).ok_or_else(short)?;
        if tail.matches('\n').count() != newlines || (newlines > 0 && !tail.ends_with('\n')) {
            return Err(miscount(&op));
        }
        append(Op { chars, lines: newlines, ..op }, &mut lines);
    }
    if !cursor.is_empty() {
        return Err(Error::invalid("attribution ends before the text does"));
    }
    let rest = assem.take();
    if !rest.is_empty() {
        lines.push(write_ops(&rest));
    }
    Ok(lines)
}

/// Concatenate per-line attribution strings back into one.
pub fn join_attribution_lines<S: AsRef<str>>(lines: &[S]) -> Result<String> {
    let mut assem = MergingAssembler::new();
    for line in lines {
        for op in parse_ops(line.as_ref())? {
            assem.append(op);
        }
    }
    Ok(write_ops(&assem.take()))
}

/// Stable identity of a line in a [`LineIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineId(u64);

impl EntryKey for LineId {}

/// A document split into lines, each weighted by its length in chars.
#[derive(Clone, Debug, Default)]
pub struct LineIndex {
    lines: SkipList<LineId, String>,
    next_id: u64,
}

impl LineIndex {
    pub fn new(text: &str) -> LineIndex {
        let mut index = LineIndex::default();
        let entries = index.entries(text);
        // Fresh ids, so this cannot collide.
        let _ = index.lines.splice(0, 0, entries);
        index
    }

    fn entries(&mut self, text: &str) -> Vec<Entry<LineId, String>> {
        split_text_lines(text)
            .into_iter()
            .map(|line| {
                let id = LineId(self.next_id);
                self.next_id += 1;
                Entry::new(id, line.chars().count(), line.to_owned())
            })
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Document length in chars.
    pub fn len(&self) -> usize {
        self.lines.total_width()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.at_index(index).map(|e| e.value.as_str())
    }

    /// Id of the line at `index`; ids survive edits to other lines.
    pub fn line_id(&self, index: usize) -> Option<LineId> {
        self.lines.at_index(index).map(|e| e.key)
    }

    pub fn index_of_line(&self, id: LineId) -> Option<usize> {
        self.lines.index_of_key(&id)
    }

    /// Char offset at which line `index` starts; the document length past the end.
    pub fn offset_of_line(&self, index: usize) -> usize {
        self.lines.offset_of_index(index)
    }

    /// Line containing the char at `offset`, or the line count past the end.
    pub fn line_of_offset(&self, offset: usize) -> usize {
        self.lines.index_of_offset(offset)
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(|e| e.value.as_str()).collect()
    }

    /// Apply `cs`, rewriting only the lines its splices touch.
    pub fn apply(&mut self, cs: &Changeset) -> Result<()> {
        if cs.old_len() != self.len() {
            return Err(Error::LengthMismatch {
                what: "line index",
                expected: cs.old_len(),
                actual: self.len(),
            });
        }
        let mut delta = 0isize;
        for splice in to_splices(cs) {
            let start = splice.start.wrapping_add_signed(delta);
            let end = splice.end.wrapping_add_signed(delta);
            self.replace(start, end, &splice.text)?;
            let inserted = splice.text.chars().count() as isize;
            delta += inserted - (splice.end - splice.start) as isize;
        }
        Ok(())
    }

    /// Replace the chars `start..end` with `text`.
    fn replace(&mut self, start: usize, end: usize, text: &str) -> Result<()> {
        let count = self.lines.len();
        let mut first = if start < self.len() {
            self.line_of_offset(start)
        } else {
            count
        };
        // Text appended to an unterminated last line joins it.
        if first == count && first > 0 && self.line(first - 1).is_some_and(|l| !l.ends_with('\n')) {
            first -= 1;
        }
        let mut last = if end > start {
            self.line_of_offset(end - 1) + 1
        } else {
            (first + 1).min(count)
        };

        let region_start = self.offset_of_line(first);
        let region: String = self
            .lines
            .iter_from(first)
            .take(last - first)
            .map(|e| e.value.as_str())
            .collect();
        let mut cursor = CharCursor::new(&region);
        let short = || Error::invalid("splice runs past the end of the text");
        let mut new_text = cursor.take(start - region_start).ok_or_else(short)?.to_owned();
        cursor.skip(end - start).ok_or_else(short)?;
        new_text.push_str(text);
        new_text.push_str(cursor.rest());
        while !new_text.is_empty() && !new_text.ends_with('\n') && last < count {
            if let Some(line) = self.line(last) {
                new_text.push_str(line);
            }
            last += 1;
        }

        let entries = self.entries(&new_text);
        self.lines.splice(first, last - first, entries)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_to_text;
    use crate::attribs::AttribSet;
    use crate::splice::make_splice;

    fn lines(index: &LineIndex) -> Vec<&str> {
        (0..index.line_count()).filter_map(|i| index.line(i)).collect()
    }

    #[test]
    fn splits_text() {
        assert_eq!(split_text_lines("a\nbc\n"), ["a\n", "bc\n"]);
        assert_eq!(split_text_lines("a\nbc"), ["a\n", "bc"]);
        assert!(split_text_lines("").is_empty());
    }

    #[test]
    fn splits_and_joins_attribution() {
        let text = "abc\ndef\nghi\n";
        let attribution = "*0+2|2+6*1|1+4";
        let split = split_attribution_lines(attribution, text).unwrap();
        assert_eq!(split, ["*0+2|1+2", "|1+4", "*1|1+4"]);
        assert_eq!(join_attribution_lines(&split).unwrap(), attribution);
    }

    #[test]
    fn split_attribution_rejects_short_text() {
        assert!(split_attribution_lines("|2+6", "ab\n").is_err());
    }

    #[test]
    fn split_attribution_rejects_short_attribution() {
        assert!(matches!(
            split_attribution_lines("+2", "a\nb\n"),
            Err(Error::InvalidChangeset(_))
        ));
        assert!(split_attribution_lines("|1+2", "a\nb\n").is_err());
    }

    #[test]
    fn split_attribution_rejects_false_newlines() {
        // "b" has no newline of its own.
        assert!(matches!(
            split_attribution_lines("|2+3", "a\nb\n"),
            Err(Error::InvalidChangeset(_))
        ));
        assert!(split_attribution_lines("|3+4", "a\nb\n").is_err());
        assert!(split_attribution_lines("|1+2+1", "a\nbc").is_err());
        assert_eq!(split_attribution_lines("|1+2+2", "a\nbc").unwrap(), ["|1+2", "+2"]);
    }

    #[test]
    fn offsets_and_lines() {
        let index = LineIndex::new("ab\ncde\n\nf\n");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.len(), 10);
        assert_eq!(index.offset_of_line(1), 3);
        assert_eq!(index.offset_of_line(4), 10);
        assert_eq!(index.line_of_offset(0), 0);
        assert_eq!(index.line_of_offset(3), 1);
        assert_eq!(index.line_of_offset(7), 2);
        assert_eq!(index.line_of_offset(10), 4);
    }

    #[test]
    fn applies_edits_line_by_line() {
        let cases: &[(&str, usize, usize, &str)] = &[
            ("a\nb\nc\n", 5, 0, "def"),
            ("a\nb\nc\n", 1, 2, ""),
            ("a\nb\nc\n", 0, 0, "x\ny"),
            ("a\nb\nc\n", 6, 0, "d\n"),
            ("a\nb\nc\n", 0, 6, "new\n"),
            ("abc", 3, 0, "\ndef"),
            ("ab\ncd\nef\n", 2, 4, "XY\nZ"),
        ];
        for &(text, start, ndel, ins) in cases {
            let cs = make_splice(text, start, ndel, ins, AttribSet::new()).unwrap();
            let expected = apply_to_text(&cs, text).unwrap();
            let mut index = LineIndex::new(text);
            index.apply(&cs).unwrap();
            assert_eq!(index.text(), expected, "{text:?} {start} {ndel} {ins:?}");
            assert_eq!(lines(&index), split_text_lines(&expected));
        }
    }

    #[test]
    fn untouched_lines_keep_their_ids() {
        let mut index = LineIndex::new("a\nb\nc\n");
        let first = index.line_id(0).unwrap();
        let last = index.line_id(2).unwrap();
        let cs = make_splice("a\nb\nc\n", 2, 1, "B", AttribSet::new()).unwrap();
        index.apply(&cs).unwrap();
        assert_eq!(lines(&index), ["a\n", "B\n", "c\n"]);
        assert_eq!(index.index_of_line(first), Some(0));
        assert_eq!(index.index_of_line(last), Some(2));
    }

    #[test]
    fn multi_splice_changeset() {
        let text = "hello\nworld\n";
        let cs: Changeset = "Z:c>2=1+1|1=5=1+1$XY".parse().unwrap();
        let mut index = LineIndex::new(text);
        index.apply(&cs).unwrap();
        assert_eq!(index.text(), "hXello\nwYorld\n");
        assert_eq!(index.line_count(), 2);
    }

    #[test]
    fn rejects_wrong_length() {
        let mut index = LineIndex::new("ab\n");
        let cs: Changeset = "Z:1>1+1$x".parse().unwrap();
        assert!(matches!(index.apply(&cs), Err(Error::LengthMismatch { .. })));
    }
}
