pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

pub(crate) fn truncate_for_details(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= 3 {
        return ".".repeat(limit);
    }

    let prefix: String = text.chars().take(limit - 3).collect();
    format!("{prefix}...")
}

/// Incremental splitter for `text/event-stream` bodies.
///
/// Bytes go in as they arrive; complete events come out as the joined
/// payload of their `data:` lines. Events are only cut at blank lines, so a
/// multi-byte character split across chunks is decoded whole.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((block_len, consumed)) = find_block_end(&self.pending) {
            let block = String::from_utf8_lossy(&self.pending[..block_len]).into_owned();
            self.pending.drain(..consumed);
            events.extend(sse_data(&block));
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        sse_data(&String::from_utf8_lossy(&rest))
    }
}

// Returns (event length, bytes to consume) for the first complete event.
fn find_block_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = buffer[from..].iter().position(|byte| *byte == b'\n') {
        let newline = from + offset;
        let block_len = match newline.checked_sub(1) {
            Some(before) if buffer[before] == b'\r' => before,
            _ => newline,
        };
        let rest = &buffer[newline + 1..];
        if rest.first() == Some(&b'\n') {
            return Some((block_len, newline + 2));
        }
        if rest.starts_with(b"\r\n") {
            return Some((block_len, newline + 3));
        }
        from = newline + 1;
    }
    None
}

fn sse_data(block: &str) -> Option<String> {
    let data = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:").map(str::trim_start))
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data)
    }
}
