// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn env(pairs: &[(&str, &str)]) -> Sequence<(String, String)> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

#[test]
fn backup_command_shape() {
    let cmd = format_command(
        "tar",
        Op::Backup,
        2,
        &env(&[("HIST", "y"), ("FILESYSTEM", "/srv")]),
        &Sequence::new(),
    );
    assert_eq!(cmd, "wrap_tar -d2 -c -I#3 -E HIST=y -E FILESYSTEM=/srv");
}

#[test]
fn recover_command_includes_nlist_triples() {
    let mut nlist = Sequence::new();
    nlist.push(NlistEntry {
        original_path: "etc/hosts".to_string(),
        fh_info: Some(42),
        destination_path: "/restore/etc/hosts".to_string(),
    });
    nlist.push(NlistEntry {
        original_path: "var/log".to_string(),
        fh_info: None,
        destination_path: "/restore/var/log".to_string(),
    });

    let cmd = format_command("dump", Op::Recover, 0, &Sequence::new(), &nlist);
    assert_eq!(
        cmd,
        "wrap_dump -x -I#3 etc/hosts @42 /restore/etc/hosts var/log @- /restore/var/log"
    );
}

#[test]
fn filehist_uses_dash_t() {
    let cmd = format_command("tar", Op::RecoverFilehist, 0, &Sequence::new(), &Sequence::new());
    assert_eq!(cmd, "wrap_tar -t -I#3");
}

#[test]
fn words_are_shell_escaped() {
    let mut cmd = String::new();
    add_word(&mut cmd, "a b$c`d\"e");
    assert_eq!(cmd, "a\\ b\\$c\\`d\\\"e");

    let envs = env(&[("PREFIX", "/mnt/data set")]);
    let full = format_command("tar", Op::Backup, 0, &envs, &Sequence::new());
    assert!(full.contains("PREFIX=/mnt/data\\ set"));
}
