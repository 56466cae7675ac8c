/// Split `text` into segments of at most `max_len` characters for delivery.
///
/// Text that already fits is returned unchanged, even when empty. Longer text
/// is cut at the best break inside each `max_len` window: a paragraph break or
/// line break in the window's second half, then a sentence end, then a space,
/// and finally a hard cut. Segments are trimmed and empty ones dropped.
pub fn split_reply(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }
    let max_len = max_len.max(1);

    let mut segments = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let Some((window_end, _)) = rest.char_indices().nth(max_len) else {
            push_trimmed(&mut segments, rest);
            break;
        };
        let window = &rest[..window_end];
        let cut = break_point(window, max_len / 2).unwrap_or(window_end);
        let (head, tail) = rest.split_at(cut);
        push_trimmed(&mut segments, head);
        rest = tail.trim_start();
    }
    segments
}

fn push_trimmed(segments: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

/// Byte offset to cut `window` at. Always greater than zero.
fn break_point(window: &str, mid_chars: usize) -> Option<usize> {
    let mid = window
        .char_indices()
        .nth(mid_chars)
        .map_or(window.len(), |(i, _)| i);

    for separator in ["\n\n", "\n"] {
        if let Some(i) = window.rfind(separator).filter(|&i| i >= mid) {
            return Some(i + separator.len());
        }
    }

    let sentence_end = [". ", "! ", "? "]
        .iter()
        .filter_map(|end| window.rfind(end))
        .max();
    if let Some(i) = sentence_end {
        return Some(i + 1);
    }

    window.rfind(' ').map(|i| i + 1)
}
