//! Workbook-globals record list with position anchors.
//!
//! The globals stream is edited by inserting records "after the last FONT",
//! "after the last BOUNDSHEET" and so on. Rather than rescanning, the list
//! remembers where those records are and shifts the remembered positions on
//! every insert and remove. All structural edits must go through
//! [`WorkbookRecordList::add`] and [`WorkbookRecordList::remove`].

use duke_xls_records::Record;

/// Record positions tracked across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Protect,
    BoundSheet,
    TabId,
    Font,
    ExtendedFormat,
    Backup,
    Name,
    SupBook,
    ExternSheet,
    Palette,
}

impl Anchor {
    pub const ALL: [Anchor; 10] = [
        Anchor::Protect,
        Anchor::BoundSheet,
        Anchor::TabId,
        Anchor::Font,
        Anchor::ExtendedFormat,
        Anchor::Backup,
        Anchor::Name,
        Anchor::SupBook,
        Anchor::ExternSheet,
        Anchor::Palette,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkbookRecordList {
    records: Vec<Record>,
    anchors: [Option<usize>; 10],
}

impl WorkbookRecordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. Anchors are left untouched.
    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&Record> {
        self.records.get(pos)
    }

    /// In-place access. Replacing a record through this does not move anchors.
    pub fn get_mut(&mut self, pos: usize) -> Option<&mut Record> {
        self.records.get_mut(pos)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Append without shifting anchors (used while the list is being built).
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Insert at `pos`, shifting every anchor at or after `pos` up by one.
    pub fn add(&mut self, pos: usize, record: Record) {
        let pos = pos.min(self.records.len());
        self.records.insert(pos, record);
        self.shift_anchors(pos, true);
    }

    /// Remove at `pos`, shifting every anchor at or after `pos` down by one.
    pub fn remove(&mut self, pos: usize) -> Option<Record> {
        if pos >= self.records.len() {
            return None;
        }
        let removed = self.records.remove(pos);
        self.shift_anchors(pos, false);
        Some(removed)
    }

    fn shift_anchors(&mut self, pos: usize, added: bool) {
        for anchor in self.anchors.iter_mut().flatten() {
            if *anchor >= pos {
                if added {
                    *anchor += 1;
                } else {
                    *anchor = anchor.saturating_sub(1);
                }
            }
        }
    }

    pub fn anchor(&self, anchor: Anchor) -> Option<usize> {
        self.anchors[anchor.slot()]
    }

    pub fn set_anchor(&mut self, anchor: Anchor, pos: Option<usize>) {
        self.anchors[anchor.slot()] = pos;
    }

    pub fn find_first_loc_by_sid(&self, sid: u16) -> Option<usize> {
        self.records.iter().position(|r| r.sid() == sid)
    }

    pub fn find_first_by_sid(&self, sid: u16) -> Option<&Record> {
        self.records.iter().find(|r| r.sid() == sid)
    }

    /// The `nth` (0-based) record with this sid.
    pub fn find_nth_by_sid(&self, sid: u16, nth: usize) -> Option<&Record> {
        self.records.iter().filter(|r| r.sid() == sid).nth(nth)
    }

    /// Position of the `nth` (0-based) record with this sid.
    pub fn find_nth_loc_by_sid(&self, sid: u16, nth: usize) -> Option<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.sid() == sid)
            .nth(nth)
            .map(|(i, _)| i)
    }

    pub fn count_by_sid(&self, sid: u16) -> usize {
        self.records.iter().filter(|r| r.sid() == sid).count()
    }
}
