//! Property tests for the record codecs.

use duke_xls_records::record::{SstRecord, UnicodeString};
use duke_xls_records::stream::{read_records_from_bytes, write_record};
use duke_xls_records::{sid, Record};
use proptest::prelude::*;

fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,40}",
        "[\u{00c0}-\u{00ff}a-z]{1,20}",
        "[\u{0400}-\u{04ff}a-z]{1,300}",
    ]
}

proptest! {
    #[test]
    fn sst_survives_continue_splitting(strings in prop::collection::vec(text(), 1..400)) {
        let mut sst = SstRecord::new();
        for s in &strings {
            sst.add_string(UnicodeString::new(s));
        }
        let mut out = Vec::new();
        sst.serialize(&mut out);
        let raws = read_records_from_bytes(&out).unwrap();
        prop_assert_eq!(raws.len(), 1);
        match Record::decode(&raws[0]) {
            Record::Sst(back) => prop_assert_eq!(back, sst),
            other => prop_assert!(false, "decoded {:?}", other.sid()),
        }
    }

    #[test]
    fn framing_preserves_bodies(bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..20000), 1..5)) {
        let mut out = Vec::new();
        for body in &bodies {
            write_record(&mut out, sid::EXTERNSHEET, body);
        }
        let raws = read_records_from_bytes(&out).unwrap();
        // consecutive EXTERNSHEET bodies only merge through CONTINUE
        prop_assert_eq!(raws.len(), bodies.len());
        for (raw, body) in raws.iter().zip(&bodies) {
            prop_assert_eq!(&raw.data, body);
        }
    }
}
