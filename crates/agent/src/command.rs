// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Format-subprocess command-line assembly.
//!
//! `wrap_<bu_type> [-d N] {-c|-x|-t} -I#3 [-E NAME=VALUE …]
//! [ORIG @fhinfo DEST …]`, each word escaped for `/bin/sh`.

use std::fmt::Write as _;

use ndm_core::collect::Sequence;

use crate::dacb::{NlistEntry, Op};

/// Characters that need a backslash inside an unquoted sh word.
const SH_SPECIALS: &str = " \t`'\"$\\!*?[]();&<>|#~";

/// Append one sh-escaped word.
pub fn add_word(cmd: &mut String, word: &str) {
    if !cmd.is_empty() {
        cmd.push(' ');
    }
    for c in word.chars() {
        if SH_SPECIALS.contains(c) {
            cmd.push('\\');
        }
        cmd.push(c);
    }
}

/// Build the full command for one operation.
pub fn format_command(
    bu_type: &str,
    op: Op,
    log_level: u32,
    env_tab: &Sequence<(String, String)>,
    nlist_tab: &Sequence<NlistEntry>,
) -> String {
    let mut cmd = format!("wrap_{}", bu_type);

    if log_level > 0 {
        let _ = write!(cmd, " -d{}", log_level);
    }

    match op {
        Op::Backup => cmd.push_str(" -c"),
        Op::Recover => cmd.push_str(" -x"),
        Op::RecoverFilehist => cmd.push_str(" -t"),
        Op::None => {}
    }

    cmd.push_str(" -I#3");

    for (name, value) in env_tab {
        add_word(&mut cmd, "-E");
        add_word(&mut cmd, &format!("{}={}", name, value));
    }

    if op != Op::Backup {
        for entry in nlist_tab {
            add_word(&mut cmd, &entry.original_path);
            match entry.fh_info {
                Some(fh) => {
                    let _ = write!(cmd, " @{}", fh);
                }
                None => cmd.push_str(" @-"),
            }
            add_word(&mut cmd, &entry.destination_path);
        }
    }

    cmd
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
