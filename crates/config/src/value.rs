// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scalar value parsers for the typed item handlers.
//!
//! Sizes: bare `k,M,G,T` (or with a trailing uppercase `B`) are decimal
//! powers of 1000; a trailing lowercase `b` (`kb,Mb,Gb,Tb`) marks binary
//! powers of 1024. Times accept multi-part phrases like `1 day 2 hours`.
//! Speeds are bytes per second with decimal `k`/`m` multipliers.

/// Parse a size phrase into bytes.
pub fn parse_size(input: &str) -> Option<u64> {
    let compact: String = input.split_whitespace().collect();
    if compact.is_empty() {
        return None;
    }
    let (num, suffix) = split_number(&compact)?;

    let mult: f64 = if suffix.is_empty() {
        1.0
    } else if let Some(prefix) = suffix.strip_suffix('b') {
        // lowercase b: binary units
        match prefix.to_ascii_lowercase().as_str() {
            "k" => 1024.0,
            "m" => 1024.0 * 1024.0,
            "g" => 1024.0 * 1024.0 * 1024.0,
            "t" => 1024.0f64.powi(4),
            _ => return None,
        }
    } else {
        // bare letter, optionally followed by an uppercase B for "bytes"
        let prefix = suffix.strip_suffix('B').unwrap_or(suffix);
        match prefix.to_ascii_lowercase().as_str() {
            "" => 1.0,
            "k" => 1_000.0,
            "m" => 1_000_000.0,
            "g" => 1_000_000_000.0,
            "t" => 1_000_000_000_000.0,
            _ => return None,
        }
    };

    let value: f64 = num.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * mult) as u64)
}

/// Parse a time phrase into seconds. Accepts repeated `<number> <unit>`
/// parts; a bare number is seconds.
pub fn parse_time(input: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut any = false;

    // split into number/word runs so both "2h" and "2 hours" work
    let mut parts: Vec<String> = Vec::new();
    for tok in input.split_whitespace() {
        let mut cur = String::new();
        let mut cur_digit = None;
        for c in tok.chars() {
            let is_digit = c.is_ascii_digit() || c == '.';
            if cur_digit.is_some_and(|d| d != is_digit) {
                parts.push(std::mem::take(&mut cur));
            }
            cur_digit = Some(is_digit);
            cur.push(c);
        }
        if !cur.is_empty() {
            parts.push(cur);
        }
    }

    let mut i = 0;
    while i < parts.len() {
        let num: f64 = parts[i].parse().ok()?;
        let (mult, consumed) = match parts.get(i + 1) {
            Some(unit) => (time_unit(unit)?, 2),
            None => (1, 1),
        };
        total += (num * mult as f64) as u64;
        any = true;
        i += consumed;
    }
    if any {
        Some(total)
    } else {
        None
    }
}

fn time_unit(unit: &str) -> Option<u64> {
    Some(match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        "mo" | "month" | "months" => 30 * 86_400,
        "y" | "year" | "years" => 365 * 86_400,
        _ => return None,
    })
}

/// Parse a speed phrase into bytes per second.
pub fn parse_speed(input: &str) -> Option<u64> {
    let compact: String = input.split_whitespace().collect();
    let compact = compact
        .strip_suffix("/s")
        .unwrap_or(&compact)
        .to_string();
    let (num, suffix) = split_number(&compact)?;
    let mult: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        _ => return None,
    };
    let value: f64 = num.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    Some((value * mult as f64) as u64)
}

pub fn parse_bool(input: &str) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn split_number(s: &str) -> Option<(&str, &str)> {
    let split = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if split == 0 {
        return None;
    }
    Some((&s[..split], &s[split..]))
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
