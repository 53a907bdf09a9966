// sse.rs - Minimal blocking Server-Sent Events reader.
//
// Reads `event:` / `data:` fields line by line and yields one SseEvent per
// blank-line-terminated block. Comment lines (keep-alive pings) are skipped.

use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; "message" when the block carried none.
    pub event: String,
    /// Data lines joined with '\n'.
    pub data: String,
}

pub struct SseReader<R> {
    reader: R,
}

impl<R: BufRead> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> Iterator for SseReader<R> {
    type Item = std::io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut event: Option<String> = None;
        let mut data: Vec<String> = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let read = match self.reader.read_line(&mut line) {
                Ok(read) => read,
                Err(e) => return Some(Err(e)),
            };
            let trimmed = line.trim_end_matches(['\r', '\n']);

            if read == 0 || trimmed.is_empty() {
                if event.is_some() || !data.is_empty() {
                    return Some(Ok(SseEvent {
                        event: event.unwrap_or_else(|| "message".to_string()),
                        data: data.join("\n"),
                    }));
                }
                if read == 0 {
                    return None;
                }
                continue;
            }
            if trimmed.starts_with(':') {
                continue;
            }

            let (field, value) = match trimmed.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (trimmed, ""),
            };
            match field {
                "event" => event = Some(value.to_string()),
                "data" => data.push(value.to_string()),
                _ => {}
            }
        }
    }
}
