//! Page settings block: breaks, header/footer, centering, margins and print
//! setup.

use duke_xls_records::record::{HeaderFooterRecord, PageBreak, PageBreakRecord, PrintSetupRecord};
use duke_xls_records::{sid, Record};

use crate::error::{XlsError, XlsResult};
use crate::sheet::substream::CustomViewBlock;
use crate::sheet::RecordAggregate;
use crate::stream::RecordStream;

/// Whether `s` belongs in a page settings block.
pub fn is_component_record(s: u16) -> bool {
    matches!(
        s,
        sid::HORIZONTALPAGEBREAKS
            | sid::VERTICALPAGEBREAKS
            | sid::HEADER
            | sid::FOOTER
            | sid::HCENTER
            | sid::VCENTER
            | sid::LEFTMARGIN
            | sid::RIGHTMARGIN
            | sid::TOPMARGIN
            | sid::BOTTOMMARGIN
            | sid::PLS
            | sid::SETUP
            | sid::BITMAP
            | sid::PRINTSIZE
            | sid::HEADERFOOTER
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    Left,
    Right,
    Top,
    Bottom,
}

impl Margin {
    fn sid(self) -> u16 {
        match self {
            Margin::Left => sid::LEFTMARGIN,
            Margin::Right => sid::RIGHTMARGIN,
            Margin::Top => sid::TOPMARGIN,
            Margin::Bottom => sid::BOTTOMMARGIN,
        }
    }

    fn default_inches(self) -> f64 {
        match self {
            Margin::Left | Margin::Right => 0.75,
            Margin::Top | Margin::Bottom => 1.0,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// GUID of the sheet view a HEADERFOOTER record belongs to (all zero for
/// the sheet itself).
fn header_footer_guid(record: &Record) -> Option<&[u8]> {
    match record {
        Record::Unknown { sid: sid::HEADERFOOTER, data } if data.len() >= 28 => Some(&data[12..28]),
        _ => None,
    }
}

fn is_current_sheet(record: &Record) -> bool {
    header_footer_guid(record).map_or(true, |guid| guid.iter().all(|&b| b == 0))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSettingsBlock {
    row_breaks: Option<PageBreakRecord>,
    column_breaks: Option<PageBreakRecord>,
    header: Option<HeaderFooterRecord>,
    footer: Option<HeaderFooterRecord>,
    h_center: Option<u16>,
    v_center: Option<u16>,
    margins: [Option<f64>; 4],
    /// PLS records, each with its CONTINUEs.
    pls: Vec<Vec<Record>>,
    print_setup: Option<PrintSetupRecord>,
    bitmap: Option<Record>,
    print_size: Option<Record>,
    header_footer: Option<Record>,
    /// HEADERFOOTER records of custom views, waiting to be moved into them.
    sview_header_footers: Vec<Record>,
}

fn duplicate(s: u16) -> XlsError {
    XlsError::format(format!("duplicate page settings record {}", sid::name(s)))
}

fn unexpected(record: &Record) -> XlsError {
    XlsError::format(format!("page settings record {} could not be decoded", record.name()))
}

impl PageSettingsBlock {
    /// Block written for a new sheet.
    pub fn new() -> Self {
        Self {
            row_breaks: Some(PageBreakRecord::horizontal()),
            column_breaks: Some(PageBreakRecord::vertical()),
            header: Some(HeaderFooterRecord::header("")),
            footer: Some(HeaderFooterRecord::footer("")),
            h_center: Some(0),
            v_center: Some(0),
            print_setup: Some(PrintSetupRecord::default()),
            ..Self::default()
        }
    }

    pub fn read(rs: &mut RecordStream) -> XlsResult<Self> {
        let mut block = Self::default();
        block.add_late_records(rs)?;
        Ok(block)
    }

    /// Fold in component records that turn up away from the block.
    pub fn add_late_records(&mut self, rs: &mut RecordStream) -> XlsResult<()> {
        while self.read_a_record(rs)? {}
        Ok(())
    }

    fn read_a_record(&mut self, rs: &mut RecordStream) -> XlsResult<bool> {
        let Some(next) = rs.peek_next_sid() else {
            return Ok(false);
        };
        if !is_component_record(next) {
            return Ok(false);
        }
        let record = rs.next()?;
        match next {
            sid::HORIZONTALPAGEBREAKS | sid::VERTICALPAGEBREAKS => {
                let Record::PageBreak(breaks) = record else {
                    return Err(unexpected(&record));
                };
                let slot = if next == sid::HORIZONTALPAGEBREAKS {
                    &mut self.row_breaks
                } else {
                    &mut self.column_breaks
                };
                if slot.is_some() {
                    return Err(duplicate(next));
                }
                *slot = Some(breaks);
            }
            sid::HEADER | sid::FOOTER => {
                let Record::HeaderFooter(text) = record else {
                    return Err(unexpected(&record));
                };
                let slot = if next == sid::HEADER {
                    &mut self.header
                } else {
                    &mut self.footer
                };
                if slot.is_some() {
                    return Err(duplicate(next));
                }
                *slot = Some(text);
            }
            sid::HCENTER | sid::VCENTER => {
                let value = record.short_value(next).ok_or_else(|| unexpected(&record))?;
                let slot = if next == sid::HCENTER {
                    &mut self.h_center
                } else {
                    &mut self.v_center
                };
                if slot.is_some() {
                    return Err(duplicate(next));
                }
                *slot = Some(value);
            }
            sid::LEFTMARGIN | sid::RIGHTMARGIN | sid::TOPMARGIN | sid::BOTTOMMARGIN => {
                let value = record.double_value(next).ok_or_else(|| unexpected(&record))?;
                let margin = match next {
                    sid::LEFTMARGIN => Margin::Left,
                    sid::RIGHTMARGIN => Margin::Right,
                    sid::TOPMARGIN => Margin::Top,
                    _ => Margin::Bottom,
                };
                if self.margins[margin.slot()].is_some() {
                    return Err(duplicate(next));
                }
                self.margins[margin.slot()] = Some(value);
            }
            sid::PLS => {
                let mut group = vec![record];
                while rs.peek_next_sid() == Some(sid::CONTINUE) {
                    group.push(rs.next()?);
                }
                self.pls.push(group);
            }
            sid::SETUP => {
                let Record::PrintSetup(setup) = record else {
                    return Err(unexpected(&record));
                };
                if self.print_setup.is_some() {
                    return Err(duplicate(next));
                }
                self.print_setup = Some(setup);
            }
            sid::BITMAP => {
                if self.bitmap.is_some() {
                    return Err(duplicate(next));
                }
                self.bitmap = Some(record);
            }
            sid::PRINTSIZE => {
                if self.print_size.is_some() {
                    return Err(duplicate(next));
                }
                self.print_size = Some(record);
            }
            _ => {
                // one per sheet view; only the sheet's own belongs here
                if is_current_sheet(&record) {
                    self.header_footer = Some(record);
                } else {
                    self.sview_header_footers.push(record);
                }
            }
        }
        Ok(true)
    }

    /// HEADERFOOTER found after the block.
    pub fn add_late_header_footer(&mut self, record: Record) -> XlsResult<()> {
        if self.header_footer.is_some() {
            return Err(XlsError::format("page settings block already has a HEADERFOOTER record"));
        }
        if record.sid() != sid::HEADERFOOTER {
            return Err(XlsError::format(format!("unexpected header-footer record {}", record.name())));
        }
        self.header_footer = Some(record);
        Ok(())
    }

    /// Move custom-view HEADERFOOTER records into the view they belong to.
    pub fn position_records(&mut self, views: &mut [CustomViewBlock]) {
        if self.sview_header_footers.is_empty() {
            return;
        }
        for view in views.iter_mut() {
            let Some(guid) = view.guid() else { continue };
            if let Some(i) = self
                .sview_header_footers
                .iter()
                .position(|hf| header_footer_guid(hf) == Some(guid.as_slice()))
            {
                let hf = self.sview_header_footers.remove(i);
                view.append(hf);
            }
        }
    }

    // ── Margins and centering ───────────────────────────────────────────

    pub fn margin(&self, margin: Margin) -> f64 {
        self.margins[margin.slot()].unwrap_or_else(|| margin.default_inches())
    }

    pub fn set_margin(&mut self, margin: Margin, inches: f64) {
        self.margins[margin.slot()] = Some(inches);
    }

    pub fn h_center(&self) -> bool {
        self.h_center.unwrap_or(0) != 0
    }

    pub fn set_h_center(&mut self, on: bool) {
        self.h_center = Some(on as u16);
    }

    pub fn v_center(&self) -> bool {
        self.v_center.unwrap_or(0) != 0
    }

    pub fn set_v_center(&mut self, on: bool) {
        self.v_center = Some(on as u16);
    }

    // ── Header, footer and print setup ──────────────────────────────────

    pub fn header(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.text.as_str())
    }

    pub fn set_header(&mut self, text: &str) {
        self.header = Some(HeaderFooterRecord::header(text));
    }

    pub fn footer(&self) -> Option<&str> {
        self.footer.as_ref().map(|f| f.text.as_str())
    }

    pub fn set_footer(&mut self, text: &str) {
        self.footer = Some(HeaderFooterRecord::footer(text));
    }

    pub fn print_setup(&self) -> Option<&PrintSetupRecord> {
        self.print_setup.as_ref()
    }

    pub fn print_setup_mut(&mut self) -> &mut PrintSetupRecord {
        self.print_setup.get_or_insert_with(PrintSetupRecord::default)
    }

    // ── Page breaks ─────────────────────────────────────────────────────

    fn row_breaks_mut(&mut self) -> &mut PageBreakRecord {
        self.row_breaks.get_or_insert_with(PageBreakRecord::horizontal)
    }

    fn column_breaks_mut(&mut self) -> &mut PageBreakRecord {
        self.column_breaks.get_or_insert_with(PageBreakRecord::vertical)
    }

    pub fn set_row_break(&mut self, row: u16, from_col: u16, to_col: u16) {
        self.row_breaks_mut().add_break(row, from_col, to_col);
    }

    pub fn remove_row_break(&mut self, row: u16) -> XlsResult<()> {
        let breaks = self.row_breaks_mut();
        if breaks.is_empty() {
            return Err(XlsError::argument("sheet does not define any row breaks"));
        }
        breaks.remove_break(row);
        Ok(())
    }

    pub fn is_row_broken(&self, row: u16) -> bool {
        self.row_breaks.as_ref().map_or(false, |b| b.get_break(row).is_some())
    }

    pub fn row_breaks(&self) -> &[PageBreak] {
        self.row_breaks.as_ref().map_or(&[], |b| b.breaks())
    }

    pub fn set_column_break(&mut self, col: u16, from_row: u16, to_row: u16) {
        self.column_breaks_mut().add_break(col, from_row, to_row);
    }

    pub fn remove_column_break(&mut self, col: u16) {
        self.column_breaks_mut().remove_break(col);
    }

    pub fn is_column_broken(&self, col: u16) -> bool {
        self.column_breaks.as_ref().map_or(false, |b| b.get_break(col).is_some())
    }

    pub fn column_breaks(&self) -> &[PageBreak] {
        self.column_breaks.as_ref().map_or(&[], |b| b.breaks())
    }

    /// Move row breaks in `start..=stop` by `count` rows.
    pub fn shift_row_breaks(&mut self, start: u16, stop: u16, count: i32) {
        shift_breaks(self.row_breaks_mut(), start, stop, count);
    }

    /// Move column breaks in `start..=stop` by `count` columns.
    pub fn shift_column_breaks(&mut self, start: u16, stop: u16, count: i32) {
        shift_breaks(self.column_breaks_mut(), start, stop, count);
    }
}

fn shift_breaks(breaks: &mut PageBreakRecord, start: u16, stop: u16, count: i32) {
    let shifted: Vec<PageBreak> = breaks
        .breaks()
        .iter()
        .filter(|b| b.main >= start && b.main <= stop)
        .copied()
        .collect();
    for b in shifted {
        breaks.remove_break(b.main);
        let main = (b.main as i32 + count).clamp(0, u16::MAX as i32) as u16;
        breaks.add_break(main, b.sub_from, b.sub_to);
    }
}

fn visit_breaks(breaks: &Option<PageBreakRecord>, visitor: &mut dyn FnMut(&Record)) {
    if let Some(b) = breaks {
        // empty break lists are left out
        if !b.is_empty() {
            visitor(&Record::PageBreak(b.clone()));
        }
    }
}

impl RecordAggregate for PageSettingsBlock {
    fn visit_records(&self, visitor: &mut dyn FnMut(&Record)) {
        visit_breaks(&self.row_breaks, visitor);
        visit_breaks(&self.column_breaks, visitor);
        let header = self.header.clone().unwrap_or_else(|| HeaderFooterRecord::header(""));
        visitor(&Record::HeaderFooter(header));
        let footer = self.footer.clone().unwrap_or_else(|| HeaderFooterRecord::footer(""));
        visitor(&Record::HeaderFooter(footer));
        if let Some(v) = self.h_center {
            visitor(&Record::short(sid::HCENTER, v));
        }
        if let Some(v) = self.v_center {
            visitor(&Record::short(sid::VCENTER, v));
        }
        for margin in [Margin::Left, Margin::Right, Margin::Top, Margin::Bottom] {
            if let Some(v) = self.margins[margin.slot()] {
                visitor(&Record::double(margin.sid(), v));
            }
        }
        for group in &self.pls {
            group.iter().for_each(|r| visitor(r));
        }
        if let Some(setup) = &self.print_setup {
            visitor(&Record::PrintSetup(setup.clone()));
        }
        for r in [&self.print_size, &self.header_footer, &self.bitmap].into_iter().flatten() {
            visitor(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sids(block: &PageSettingsBlock) -> Vec<u16> {
        let mut out = Vec::new();
        block.visit_records(&mut |r| out.push(r.sid()));
        out
    }

    #[test]
    fn new_block_skips_empty_breaks() {
        let block = PageSettingsBlock::new();
        assert_eq!(
            sids(&block),
            vec![sid::HEADER, sid::FOOTER, sid::HCENTER, sid::VCENTER, sid::SETUP]
        );
    }

    #[test]
    fn margins_default_until_set() {
        let mut block = PageSettingsBlock::new();
        assert_eq!(block.margin(Margin::Left), 0.75);
        assert_eq!(block.margin(Margin::Top), 1.0);
        block.set_margin(Margin::Top, 0.5);
        assert_eq!(block.margin(Margin::Top), 0.5);
        assert!(sids(&block).contains(&sid::TOPMARGIN));
    }

    #[test]
    fn read_stops_at_first_foreign_record() {
        let mut rs = RecordStream::new(vec![
            Record::HeaderFooter(HeaderFooterRecord::header("&P")),
            Record::double(sid::LEFTMARGIN, 0.5),
            Record::short(sid::DEFCOLWIDTH, 8),
        ]);
        let block = PageSettingsBlock::read(&mut rs).unwrap();
        assert_eq!(block.header(), Some("&P"));
        assert_eq!(block.footer(), None);
        assert_eq!(rs.peek_next_sid(), Some(sid::DEFCOLWIDTH));
        // a missing footer is written empty
        assert_eq!(sids(&block), vec![sid::HEADER, sid::FOOTER, sid::LEFTMARGIN]);
    }

    #[test]
    fn duplicate_component_is_rejected() {
        let mut rs = RecordStream::new(vec![
            Record::short(sid::HCENTER, 1),
            Record::short(sid::HCENTER, 0),
        ]);
        assert!(matches!(PageSettingsBlock::read(&mut rs), Err(XlsError::InvalidFormat(_))));
    }

    #[test]
    fn row_breaks_shift_within_range() {
        let mut block = PageSettingsBlock::new();
        block.set_row_break(5, 0, 255);
        block.set_row_break(10, 0, 255);
        block.set_row_break(20, 0, 255);
        block.shift_row_breaks(8, 15, 3);
        let mains: Vec<u16> = block.row_breaks().iter().map(|b| b.main).collect();
        assert!(mains.contains(&5) && mains.contains(&13) && mains.contains(&20));
        assert!(!block.is_row_broken(10));
        assert!(block.is_row_broken(13));
    }

    #[test]
    fn removing_a_row_break_without_breaks_fails() {
        let mut block = PageSettingsBlock::new();
        assert!(block.remove_row_break(3).is_err());
        block.set_row_break(3, 0, 255);
        block.remove_row_break(3).unwrap();
        assert!(!block.is_row_broken(3));
    }
}
