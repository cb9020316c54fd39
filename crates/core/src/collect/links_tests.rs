// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn collect(list: &LinkList<i32>) -> Vec<i32> {
    list.iter().copied().collect()
}

#[test]
fn append_prepend_order() {
    let mut list = LinkList::new();
    list.append(2);
    list.append(3);
    list.prepend(1);
    assert_eq!(collect(&list), vec![1, 2, 3]);
    assert_eq!(list.first(), Some(&1));
    assert_eq!(list.last(), Some(&3));
}

#[test]
fn insert_before_and_after() {
    let mut list = LinkList::new();
    let b = list.append(2);
    list.insert_before(1, b);
    list.insert_after(3, b);
    assert_eq!(collect(&list), vec![1, 2, 3]);
}

#[test]
fn remove_relinks_neighbors() {
    let mut list = LinkList::new();
    let a = list.append(1);
    let b = list.append(2);
    let c = list.append(3);

    assert_eq!(list.remove(b), Some(2));
    assert_eq!(collect(&list), vec![1, 3]);

    assert_eq!(list.remove(a), Some(1));
    assert_eq!(list.remove(c), Some(3));
    assert!(list.is_empty());
    assert_eq!(list.first(), None);

    // arena slots are reused after removal
    list.append(9);
    assert_eq!(collect(&list), vec![9]);
}

#[test]
fn binary_insert_keeps_sorted_order() {
    let mut list = LinkList::new();
    for v in [5, 1, 4, 2, 3] {
        list.binary_insert(v, |a, b| a.cmp(b), TiePolicy::AllowDuplicates)
            .unwrap();
    }
    assert_eq!(collect(&list), vec![1, 2, 3, 4, 5]);
}

#[test]
fn binary_insert_first_match_wins_rejects_duplicate() {
    let mut list = LinkList::new();
    let first = list
        .binary_insert(7, |a, b| a.cmp(b), TiePolicy::FirstMatchWins)
        .unwrap();

    let err = list
        .binary_insert(7, |a, b| a.cmp(b), TiePolicy::FirstMatchWins)
        .unwrap_err();
    assert_eq!(err.0, first);
    assert_eq!(err.1, 7);
    assert_eq!(list.len(), 1);
}

#[test]
fn binary_insert_allow_duplicates_inserts_after_match() {
    let mut list = LinkList::new();
    for v in [1, 2, 2, 3] {
        list.binary_insert(v, |a, b| a.cmp(b), TiePolicy::AllowDuplicates)
            .unwrap();
    }
    assert_eq!(collect(&list), vec![1, 2, 2, 3]);
    assert_eq!(list.len(), 4);
}
