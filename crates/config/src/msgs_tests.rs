// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn dest_of(src: &str, code: DestCode) -> DestSpec {
    let mut lex = Lexer::new(src).unwrap();
    parse_dest(&mut lex, code).unwrap().0
}

#[test]
fn listed_destination_takes_types_directly() {
    let dest = dest_of("info, warning\n", DestCode::Console);
    assert!(dest.types.contains(MessageType::Info));
    assert!(dest.types.contains(MessageType::Warning));
    assert!(!dest.types.contains(MessageType::Error));
    assert!(dest.targets.is_empty());
}

#[test]
fn addressed_destination_splits_recipients_and_types() {
    let dest = dest_of("ops@x.example, oncall@x.example = error, fatal\n", DestCode::Mail);
    assert_eq!(dest.targets, vec!["ops@x.example", "oncall@x.example"]);
    assert!(dest.types.contains(MessageType::Error));
    assert!(dest.types.contains(MessageType::Fatal));
    assert!(!dest.types.contains(MessageType::Info));
}

#[test]
fn file_destination_takes_one_path() {
    let dest = dest_of("\"/var/log/ndm.log\" = all\n", DestCode::Append);
    assert_eq!(dest.targets, vec!["/var/log/ndm.log"]);
    assert!(dest.types.contains(MessageType::Debug));
}

#[test]
fn all_with_negation() {
    let dest = dest_of("all, !skipped, !saved\n", DestCode::Stdout);
    assert!(dest.types.contains(MessageType::Error));
    assert!(dest.types.contains(MessageType::Info));
    assert!(!dest.types.contains(MessageType::Skipped));
    assert!(!dest.types.contains(MessageType::Saved));
}

#[test]
fn unknown_type_is_an_error() {
    let mut lex = Lexer::new("verbose\n").unwrap();
    assert_eq!(
        parse_dest(&mut lex, DestCode::Stdout),
        Err(MsgsError::UnknownType("verbose".into()))
    );
}

#[test]
fn addressed_without_recipient_is_an_error() {
    let mut lex = Lexer::new("= all\n").unwrap();
    assert_eq!(
        parse_dest(&mut lex, DestCode::Operator),
        Err(MsgsError::MissingTarget("operator"))
    );
}

#[test]
fn eof_terminates_type_list() {
    let dest = dest_of("mount", DestCode::Stderr);
    assert!(dest.types.contains(MessageType::Mount));
}

#[test]
fn closing_brace_ends_the_list_and_is_reported() {
    let mut lex = Lexer::new("info }\n").unwrap();
    let (dest, hit_eob) = parse_dest(&mut lex, DestCode::Stdout).unwrap();
    assert!(dest.types.contains(MessageType::Info));
    assert!(hit_eob);
}
