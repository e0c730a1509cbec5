use std::collections::{HashMap, HashSet};

use duke_xls::drawing::DrawingManager;
use duke_xls::record_list::Anchor;
use duke_xls::{InternalWorkbook, WorkbookOptions};
use duke_xls_records::escher::{EscherDg, EscherDgg};
use duke_xls_records::sid;
use proptest::prelude::*;

fn blank() -> InternalWorkbook {
    InternalWorkbook::create_workbook_default(&WorkbookOptions::default()).unwrap()
}

fn anchor_sid(anchor: Anchor) -> u16 {
    match anchor {
        Anchor::Protect => sid::PROTECT,
        Anchor::BoundSheet => sid::BOUNDSHEET,
        Anchor::TabId => sid::TABID,
        Anchor::Font => sid::FONT,
        Anchor::ExtendedFormat => sid::XF,
        Anchor::Backup => sid::BACKUP,
        Anchor::Name => sid::NAME,
        Anchor::SupBook => sid::SUPBOOK,
        Anchor::ExternSheet => sid::EXTERNSHEET,
        Anchor::Palette => sid::PALETTE,
    }
}

fn apply(wb: &mut InternalWorkbook, op: u8, step: usize) {
    match op {
        0 => {
            wb.create_new_font().unwrap();
        }
        1 => {
            wb.create_cell_xf().unwrap();
        }
        2 => {
            wb.create_format(&format!("0.{step}")).unwrap();
        }
        3 => {
            wb.add_bound_sheet(&format!("P{step}")).unwrap();
        }
        4 if wb.num_sheets() > 1 => wb.remove_sheet(0).unwrap(),
        5 => {
            wb.create_name(&format!("n{step}"), 0).unwrap();
        }
        6 if wb.num_names() > 0 => {
            wb.remove_name(0).unwrap();
        }
        7 => {
            wb.custom_palette().unwrap();
        }
        8 => wb.write_protect_workbook("pw", "someone").unwrap(),
        9 => {
            wb.check_extern_sheet(wb.num_sheets() - 1).unwrap();
        }
        _ => {}
    }
}

proptest! {
    #[test]
    fn anchors_always_point_at_their_records(ops in prop::collection::vec(0u8..10, 0..40)) {
        let mut wb = blank();
        for (step, op) in ops.into_iter().enumerate() {
            apply(&mut wb, op, step);
            for anchor in Anchor::ALL {
                if let Some(pos) = wb.records().anchor(anchor) {
                    prop_assert_eq!(
                        wb.records().get(pos).map(|r| r.sid()),
                        Some(anchor_sid(anchor)),
                        "{:?} after op {} at step {}", anchor, op, step
                    );
                }
            }
            prop_assert_eq!(wb.records().count_by_sid(sid::BOUNDSHEET), wb.num_sheets());
            prop_assert_eq!(wb.records().count_by_sid(sid::NAME), wb.num_names());
        }
    }

    #[test]
    fn font_index_inverts_font_record_at(extra in 0usize..8) {
        let mut wb = blank();
        for _ in 0..extra {
            wb.create_new_font().unwrap();
        }
        let count = wb.number_of_font_records();
        prop_assert_eq!(count, 4 + extra);
        for real in 0..count {
            let index = if real > 3 { real + 1 } else { real };
            let font = wb.font_record_at(index).unwrap();
            prop_assert_eq!(wb.font_index(font).unwrap(), index);
        }
        prop_assert!(wb.font_record_at(4).is_err());
    }

    #[test]
    fn extern_sheet_entries_are_deduplicated(
        pairs in prop::collection::vec((0i16..4, 0i16..4), 1..30)
    ) {
        let mut wb = blank();
        for i in 1..4 {
            wb.add_bound_sheet(&format!("S{i}")).unwrap();
        }
        let mut seen: HashMap<(i16, i16), usize> = HashMap::new();
        for (a, b) in pairs {
            let key = (a.min(b), a.max(b));
            let index = wb.check_extern_sheet_range(key.0, key.1).unwrap();
            if let Some(&previous) = seen.get(&key) {
                prop_assert_eq!(previous, index);
            }
            seen.insert(key, index);
        }
        let distinct: HashSet<usize> = seen.values().copied().collect();
        prop_assert_eq!(distinct.len(), seen.len());
    }

    #[test]
    fn shape_ids_are_never_handed_out_twice(
        allocations in prop::collection::vec(0usize..4, 1..3000)
    ) {
        let mut manager = DrawingManager::new(EscherDgg {
            shape_id_max: 1024,
            ..EscherDgg::default()
        });
        let mut drawings: Vec<(u16, EscherDg)> = (0..4)
            .map(|_| {
                let record = manager.create_dg_record();
                (
                    record.instance(),
                    EscherDg {
                        num_shapes: 0,
                        last_mso_spid: u32::MAX,
                    },
                )
            })
            .collect();
        let mut ids = HashSet::new();
        for pick in allocations {
            let (dg_id, dg) = &mut drawings[pick];
            let id = manager.allocate_shape_id(*dg_id, dg);
            prop_assert!(ids.insert(id), "shape id {} handed out twice", id);
            let owner = manager.dgg().clusters[(id / 1024) as usize - 1].drawing_group_id;
            prop_assert_eq!(owner, u32::from(*dg_id));
        }
        prop_assert!(manager.dgg().shape_id_max > *ids.iter().max().unwrap_or(&0));
    }
}
