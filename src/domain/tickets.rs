use std::ops::RangeInclusive;

use super::TicketNumber;

/// Zero-padded decimal rendering of a ticket at the session's width.
pub fn format_ticket(ticket: TicketNumber, width: u32) -> String {
    format!("{:0width$}", ticket, width = width as usize)
}

pub fn is_prefix_of_ticket(prefix: &str, ticket: TicketNumber, width: u32) -> bool {
    format_ticket(ticket, width).starts_with(prefix)
}

/// All ticket numbers at `width` digits that start with `prefix`.
///
/// Returns `None` when the prefix is longer than the width, is not decimal,
/// or the width overflows a `u64`.
pub fn prefix_range(prefix: &str, width: u32) -> Option<RangeInclusive<TicketNumber>> {
    let len = prefix.len() as u32;
    if len > width || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let span = 10u64.checked_pow(width - len)?;
    let head: TicketNumber = if prefix.is_empty() {
        0
    } else {
        prefix.parse().ok()?
    };
    let start = head.checked_mul(span)?;
    let end = start.checked_add(span - 1)?;
    Some(start..=end)
}

/// Whether any ticket in `start..=end` still matches the revealed prefix.
pub fn range_matches_prefix(
    start: TicketNumber,
    end: TicketNumber,
    prefix: &str,
    width: u32,
) -> bool {
    match prefix_range(prefix, width) {
        Some(range) => start <= *range.end() && *range.start() <= end,
        None => false,
    }
}
