// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ndm_wrap::Fstat;

#[test]
fn translation_keeps_the_dedicated_link_count() {
    let fstat = Fstat {
        ftype: Some(FileType::Regular),
        size: Some(1_000_000),
        links: Some(3),
        fileno: Some(42),
        ..Default::default()
    };
    let v9 = FileStatV9::from_wrap(&fstat, Some(77));
    assert_eq!(v9.links, Some(3));
    assert_eq!(v9.size, Some(1_000_000));
    assert_eq!(v9.node, Some(42));
    assert_eq!(v9.fh_info, Some(77));
}

#[test]
fn missing_type_maps_to_other() {
    let v9 = FileStatV9::from_wrap(&Fstat::default(), None);
    assert_eq!(v9.ftype, FileType::Other);
    assert_eq!(v9.fh_info, None);
}

#[test]
fn recording_sink_preserves_arrival_order_and_flush_boundary() {
    let mut sink = RecordingHistory::new();
    let v9 = FileStatV9::from_wrap(&Fstat::default(), None);

    sink.add_file(&v9, "/a");
    sink.add_dir(2, "etc", 88);
    assert_eq!(sink.flushed().len(), 0);

    sink.flush();
    assert_eq!(sink.flushed().len(), 2);

    sink.add_node(&v9);
    assert_eq!(sink.len(), 3);
    assert_eq!(sink.flushed().len(), 2);

    match &sink.entries()[1] {
        HistEntry::Dir {
            dir_fileno,
            name,
            fileno,
        } => {
            assert_eq!((*dir_fileno, name.as_str(), *fileno), (2, "etc", 88));
        }
        other => panic!("unexpected {other:?}"),
    }
}
