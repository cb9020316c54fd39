// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare = { "1234", 1234 },
    k_decimal = { "10k", 10_000 },
    kb_binary = { "10kb", 10_240 },
    g_decimal = { "10 G", 10_000_000_000 },
    gb_decimal = { "10 GB", 10_000_000_000 },
    gb_binary = { "10 Gb", 10_737_418_240 },
    tb_binary = { "1 Tb", 1_099_511_627_776 },
    t_decimal = { "1T", 1_000_000_000_000 },
    fractional = { "1.5 k", 1_500 },
    mb_binary = { "2Mb", 2 * 1024 * 1024 },
)]
fn sizes(input: &str, expect: u64) {
    assert_eq!(parse_size(input), Some(expect), "input {:?}", input);
}

#[parameterized(
    empty = { "" },
    no_number = { "GB" },
    bad_unit = { "10 X" },
    negative = { "-5k" },
)]
fn bad_sizes(input: &str) {
    assert_eq!(parse_size(input), None);
}

#[parameterized(
    bare_seconds = { "90", 90 },
    day_and_hours = { "1 day 2 hours", 93_600 },
    compact = { "2h", 7_200 },
    minutes = { "5 min", 300 },
    week = { "1 week", 604_800 },
    month = { "1 mo", 2_592_000 },
    year = { "1 y", 31_536_000 },
    mixed_compact = { "1d12h", 129_600 },
)]
fn times(input: &str, expect: u64) {
    assert_eq!(parse_time(input), Some(expect), "input {:?}", input);
}

#[parameterized(
    empty = { "" },
    unit_only = { "hours" },
    unknown = { "3 fortnights" },
)]
fn bad_times(input: &str) {
    assert_eq!(parse_time(input), None);
}

#[parameterized(
    bare = { "500000", 500_000 },
    k = { "100k", 100_000 },
    kb_per_s = { "100 kb/s", 100_000 },
    mb = { "2 mb/s", 2_000_000 },
)]
fn speeds(input: &str, expect: u64) {
    assert_eq!(parse_speed(input), Some(expect));
}

#[parameterized(
    yes = { "yes", true },
    upper = { "TRUE", true },
    on = { "on", true },
    one = { "1", true },
    no = { "no", false },
    off = { "off", false },
    zero = { "0", false },
)]
fn bools(input: &str, expect: bool) {
    assert_eq!(parse_bool(input), Some(expect));
}

#[test]
fn bool_rejects_junk() {
    assert_eq!(parse_bool("maybe"), None);
}
