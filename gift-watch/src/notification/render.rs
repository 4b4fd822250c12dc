//! Message rendering (Telegram HTML parse mode).

use crate::domain::{Item, Supply};
use crate::monitor::CatalogEvent;

/// Telegram `sendMessage` text limit (UTF-8 characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Escape the three characters HTML parse mode treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

fn remaining_line(supply: &Supply) -> String {
    match supply {
        Supply::Finite { total, remaining } => format!("Remaining: {remaining} of {total}"),
        Supply::Unlimited => "Remaining: \u{221e}".to_string(),
    }
}

fn id_line(item: &Item) -> String {
    format!("ID: <code>{}</code>", escape_html(&item.id))
}

/// Title line shared by every template: `<emoji> <b>label</b>: title`.
fn headline(icon: &str, label: &str, item: &Item) -> String {
    format!(
        "{icon} <b>{label}</b>: {} {}",
        escape_html(item.display_title()),
        escape_html(item.display_emoji())
    )
}

/// Detail block of an item, as used in announcements and the digest.
fn item_details(item: &Item) -> String {
    let mut lines = vec![
        format!("Price: {} \u{2b50}", item.price_units),
        remaining_line(&item.supply),
    ];
    if let Some(upgrade) = item.upgrade_price {
        lines.push(format!("Upgrade: {upgrade} \u{2b50}"));
    }
    lines.push(id_line(item));
    lines.join("\n")
}

/// Render the text of one event.
pub fn render_event(event: &CatalogEvent) -> String {
    let text = match event {
        CatalogEvent::NewItem { item } => {
            format!(
                "{}\n{}",
                headline("\u{1f381}", "New gift", item),
                item_details(item)
            )
        }
        CatalogEvent::ThresholdCrossed { item, ratio } => {
            let (remaining, total) = match item.supply {
                Supply::Finite { total, remaining } => (remaining, total),
                Supply::Unlimited => (0, 0),
            };
            format!(
                "{}\nOnly {remaining} of {total} left ({:.1}%)\n{}",
                headline("\u{26a0}\u{fe0f}", "Running low", item),
                ratio * 100.0,
                id_line(item)
            )
        }
        CatalogEvent::SoldOut { item } => {
            let total = item.supply.total().unwrap_or_default();
            format!(
                "{}\nAll {total} have been claimed\n{}",
                headline("\u{1f6ab}", "Sold out", item),
                id_line(item)
            )
        }
        CatalogEvent::UpgradeAdded { item, tokens } => {
            let tokens: Vec<String> = tokens.iter().map(|t| escape_html(t)).collect();
            format!(
                "{}\n{}\n{}",
                headline("\u{2728}", "New upgrades", item),
                tokens.join(", "),
                id_line(item)
            )
        }
    };

    truncate_message(&text, TELEGRAM_MESSAGE_LIMIT)
}

/// Render the first-run digest, split into messages under the length limit.
pub fn render_digest(items: &[&Item]) -> Vec<String> {
    const HEADER: &str = "\u{1f389} <b>Available gifts</b>";

    let mut messages = Vec::new();
    let mut current = HEADER.to_string();

    for item in items {
        let entry = format!(
            "\u{1f381} {} {}\n{}",
            escape_html(item.display_title()),
            escape_html(item.display_emoji()),
            item_details(item)
        );
        let entry = truncate_message(&entry, TELEGRAM_MESSAGE_LIMIT - HEADER.len() - 2);

        if current.chars().count() + 2 + entry.chars().count() > TELEGRAM_MESSAGE_LIMIT {
            messages.push(std::mem::replace(&mut current, HEADER.to_string()));
        }
        current.push_str("\n\n");
        current.push_str(&entry);
    }

    if !items.is_empty() {
        messages.push(current);
    }
    messages
}

/// Truncate a message to fit within the Telegram character limit.
///
/// Cuts only between whole tags, entities and characters, and closes any
/// tag left open, so the result still parses as HTML.
fn truncate_message(text: &str, limit: usize) -> String {
    const SUFFIX: &str = "\n\n[truncated]";

    if text.chars().count() <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(SUFFIX.len());

    let mut open: Vec<&str> = Vec::new();
    let mut end = 0;
    let mut used = 0;
    let mut closing: usize = 0;

    while end < text.len() {
        let rest = &text[end..];
        let token = &rest[..markup_token_len(rest)];

        let tag = token
            .strip_prefix('<')
            .map(|tag| tag.trim_end_matches('>'));
        let next_closing = match tag {
            Some(tag) if tag.starts_with('/') => {
                closing.saturating_sub(open.last().map_or(0, |name| name.len() + 3))
            }
            Some(tag) => closing + tag_name(tag).len() + 3,
            None => closing,
        };
        let next_used = used + token.chars().count();
        if next_used + next_closing > budget {
            break;
        }

        match tag {
            Some(tag) if tag.starts_with('/') => {
                open.pop();
            }
            Some(tag) => open.push(tag_name(tag)),
            None => {}
        }
        closing = next_closing;
        used = next_used;
        end += token.len();
    }

    let mut out = text[..end].to_string();
    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out.push_str(SUFFIX);
    out
}

/// Byte length of the leading tag, entity or character of `rest`.
fn markup_token_len(rest: &str) -> usize {
    let close = match rest.as_bytes().first() {
        Some(b'<') => rest.find('>'),
        Some(b'&') => rest.find(';'),
        _ => None,
    };
    close.map_or_else(|| rest.chars().next().map_or(0, char::len_utf8), |i| i + 1)
}

fn tag_name(tag: &str) -> &str {
    tag.split_whitespace().next().unwrap_or(tag)
}
