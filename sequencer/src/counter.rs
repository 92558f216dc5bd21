/// Highest frame index already persisted, or none yet.
///
/// Only [`advance_to`](SequenceCounter::advance_to) mutates it, and only
/// forward by exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounter {
    last: Option<u64>,
}

impl SequenceCounter {
    pub fn empty() -> Self {
        Self { last: None }
    }

    pub fn at(last: u64) -> Self {
        Self { last: Some(last) }
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Index the next frame will receive; `None` once `u64::MAX` is used.
    pub fn next_index(&self) -> Option<u64> {
        match self.last {
            None => Some(0),
            Some(n) => n.checked_add(1),
        }
    }

    pub(crate) fn advance_to(&mut self, index: u64) {
        debug_assert_eq!(Some(index), self.next_index());
        self.last = Some(index);
    }
}

/// `index` left-padded with zeros to `pad_length`, plus `.extension`.
pub fn frame_filename(index: u64, pad_length: usize, extension: &str) -> String {
    format!("{index:0pad_length$}.{extension}")
}

/// Parse `<digits>.<extension>` back into its index.
pub fn parse_frame_index(file_name: &str, extension: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Starting counter for an output directory listing.
///
/// Overwrite mode ignores the listing entirely. Otherwise the counter resumes
/// from the largest `<digits>.<extension>` name; other files are ignored.
pub fn compute_initial_counter<I, S>(listing: I, extension: &str, overwrite: bool) -> SequenceCounter
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if overwrite {
        return SequenceCounter::empty();
    }
    listing
        .into_iter()
        .filter_map(|name| parse_frame_index(name.as_ref(), extension))
        .max()
        .map_or_else(SequenceCounter::empty, SequenceCounter::at)
}
