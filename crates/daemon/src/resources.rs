// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource tables the data-agent daemon understands.
//!
//! Three resource types: `Daemon` (identity, plumbing, limits),
//! `Director` (who may connect and with which secret), and `Messages`
//! (destination routing). The shared parser does everything else.

use ndm_config::{ItemDef, ItemKind, ResourceTable};
use ndm_core::DestCode;

/// Default NDMP control port.
pub const DEFAULT_PORT: &str = "10000";

static DAEMON_ITEMS: &[ItemDef] = &[
    ItemDef::new("name", ItemKind::Name).required(),
    ItemDef::new("workingdirectory", ItemKind::Dir).with_default("/var/lib/ndm"),
    ItemDef::new("listen", ItemKind::Addresses),
    ItemDef::new("port", ItemKind::PInt32).with_default(DEFAULT_PORT),
    ItemDef::new("maximumconnections", ItemKind::PInt32).with_default("10"),
    ItemDef::new("heartbeatinterval", ItemKind::Time).with_default("0"),
    ItemDef::new("maximumnetworkbuffersize", ItemKind::Size32).with_default("64kb"),
    ItemDef::new("debuglevel", ItemKind::PInt32).with_default("0"),
    ItemDef::new("messages", ItemKind::Res("messages")),
    ItemDef::new("tlsenable", ItemKind::Bool).with_default("no"),
    ItemDef::new("tlsrequire", ItemKind::Bool).with_default("no"),
    ItemDef::new("tlscertificate", ItemKind::Dir),
    ItemDef::new("tlskey", ItemKind::Dir),
    ItemDef::new("tlscacertificatefile", ItemKind::Dir),
    ItemDef::new("labelformat", ItemKind::Label).with_default("ndm"),
];

static DIRECTOR_ITEMS: &[ItemDef] = &[
    ItemDef::new("name", ItemKind::Name).required(),
    ItemDef::new("password", ItemKind::Password).required(),
    ItemDef::new("address", ItemKind::Str),
    ItemDef::new("port", ItemKind::PInt32).with_default("9101"),
    ItemDef::new("tlsallowedcn", ItemKind::StrList),
    ItemDef::new("monitor", ItemKind::Bool).with_default("no"),
];

static MESSAGES_ITEMS: &[ItemDef] = &[
    ItemDef::new("name", ItemKind::Name).required(),
    ItemDef::new("mailcommand", ItemKind::Str),
    ItemDef::new("operatorcommand", ItemKind::Str),
    ItemDef::new("syslog", ItemKind::Dest(DestCode::Syslog)),
    ItemDef::new("mail", ItemKind::Dest(DestCode::Mail)),
    ItemDef::new("mailonerror", ItemKind::Dest(DestCode::MailOnError)),
    ItemDef::new("mailonsuccess", ItemKind::Dest(DestCode::MailOnSuccess)),
    ItemDef::new("file", ItemKind::Dest(DestCode::File)),
    ItemDef::new("append", ItemKind::Dest(DestCode::Append)),
    ItemDef::new("stdout", ItemKind::Dest(DestCode::Stdout)),
    ItemDef::new("stderr", ItemKind::Dest(DestCode::Stderr)),
    ItemDef::new("director", ItemKind::Dest(DestCode::Director)),
    ItemDef::new("operator", ItemKind::Dest(DestCode::Operator)),
    ItemDef::new("console", ItemKind::Dest(DestCode::Console)),
    ItemDef::new("catalog", ItemKind::Dest(DestCode::Catalog)),
];

/// The full table set for `ndmd` configuration files.
pub fn daemon_tables() -> Vec<ResourceTable> {
    vec![
        ResourceTable {
            type_name: "daemon",
            items: DAEMON_ITEMS,
            default_port: DEFAULT_PORT,
        },
        ResourceTable {
            type_name: "director",
            items: DIRECTOR_ITEMS,
            default_port: "9101",
        },
        ResourceTable {
            type_name: "messages",
            items: MESSAGES_ITEMS,
            default_port: DEFAULT_PORT,
        },
    ]
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
