//! Character cursor over a string slice.
//!
//! Changeset lengths count `char`s, while Rust strings are indexed by byte;
//! the cursor converts between the two as it walks forward.

/// Forward-only cursor that hands out `char`-counted slices.
#[derive(Clone, Debug)]
pub struct CharCursor<'a> {
    rest: &'a str,
}

/// Byte length of the first `n` chars of `s`, or `None` if `s` is shorter.
fn byte_len(s: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }
    let mut seen = 0;
    for (i, c) in s.char_indices() {
        seen += 1;
        if seen == n {
            return Some(i + c.len_utf8());
        }
    }
    return None;
}

impl<'a> CharCursor<'a> {
    pub fn new(s: &'a str) -> CharCursor<'a> {
        return CharCursor { rest: s };
    }

    /// The next `n` chars without consuming them.
    pub fn peek(&self, n: usize) -> Option<&'a str> {
        let len = byte_len(self.rest, n)?;
        return Some(&self.rest[..len]);
    }

    pub fn peek_char(&self) -> Option<char> {
        return self.rest.chars().next();
    }

    pub fn take(&mut self, n: usize) -> Option<&'a str> {
        let len = byte_len(self.rest, n)?;
        let (taken, rest) = self.rest.split_at(len);
        self.rest = rest;
        return Some(taken);
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        return self.take(n).map(|_| ());
    }

    /// Number of chars up to and including the next newline.
    pub fn chars_through_newline(&self) -> Option<usize> {
        let i = self.rest.find('\n')?;
        return Some(self.rest[..i].chars().count() + 1);
    }

    pub fn rest(&self) -> &'a str {
        return self.rest;
    }

    pub fn is_empty(&self) -> bool {
        return self.rest.is_empty();
    }
}
