//! Size-bounded, word-safe message splitting and ordered multi-part sends.

use unicode_segmentation::UnicodeSegmentation;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::SendOptions},
    Result,
};

/// Length as the Bot API counts it.
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Split `text` into parts of at most `max_len` UTF-16 units.
///
/// Boundaries follow Unicode word segmentation (UAX #29). A word longer than
/// `max_len` is cut between grapheme clusters; a lone cluster longer than
/// `max_len` is kept whole.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for segment in text.split_word_bounds() {
        let blank = segment.trim().is_empty();
        if current.is_empty() && blank {
            continue;
        }
        let segment_len = text_len(segment);

        if current_len + segment_len <= max_len {
            current.push_str(segment);
            current_len += segment_len;
            continue;
        }

        close_part(&mut parts, &mut current);
        current_len = 0;

        if blank {
            continue;
        }
        if segment_len <= max_len {
            current.push_str(segment);
            current_len = segment_len;
            continue;
        }

        for grapheme in segment.graphemes(true) {
            let grapheme_len = text_len(grapheme);
            if current_len > 0 && current_len + grapheme_len > max_len {
                close_part(&mut parts, &mut current);
                current_len = 0;
            }
            current.push_str(grapheme);
            current_len += grapheme_len;
        }
    }
    close_part(&mut parts, &mut current);

    parts
}

fn close_part(parts: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    current.clear();
}

/// Split and send strictly in order; returns the sent ids in send order.
///
/// The keyboard (if any) is attached to the last part only.
pub async fn send_text(
    api: &dyn MessagingPort,
    chat_id: ChatId,
    text: &str,
    max_len: usize,
    opts: &SendOptions,
) -> Result<Vec<MessageRef>> {
    let parts = split_text(text, max_len);
    let last = parts.len().saturating_sub(1);

    let mut sent = Vec::with_capacity(parts.len());
    for (idx, part) in parts.iter().enumerate() {
        let part_opts = if idx == last {
            opts.clone()
        } else {
            SendOptions {
                keyboard: None,
                ..opts.clone()
            }
        };
        sent.push(api.send_message(chat_id, part, &part_opts).await?);
    }
    Ok(sent)
}
