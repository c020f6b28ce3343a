//! Server-sent events reader shared by the streaming backends

use std::io::{BufRead, BufReader, Lines, Read};

use crate::Outcome;

/// Parses one `data:` payload; `None` means the event carries no text
pub(crate) type ParseEvent = fn(&str) -> Option<Outcome<String>>;

/// Iterator over the text fragments of an SSE response body
pub(crate) struct SseFragments<R> {
    lines: Lines<BufReader<R>>,
    parse: ParseEvent,
    done: bool,
}

impl<R: Read> SseFragments<R> {
    pub(crate) fn new(body: R, parse: ParseEvent) -> Self {
        Self {
            lines: BufReader::new(body).lines(),
            parse,
            done: false,
        }
    }
}

impl<R: Read> Iterator for SseFragments<R> {
    type Item = Outcome<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Outcome::Fatal(e.into()));
                }
            };

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.done = true;
                return None;
            }

            if let Some(item) = (self.parse)(data) {
                return Some(item);
            }
        }
    }
}
