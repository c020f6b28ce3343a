//! Bench stand-in for the handset: events typed on stdin

use std::io::BufRead;

use crossbeam_channel::Sender;

use super::{HardwareEvent, Key};

/// Parse one typed line
///
/// `up`/`lift` and `down`/`hang` move the handset; a single keypad
/// character presses that key.
#[must_use]
pub fn parse_console_line(line: &str) -> Option<HardwareEvent> {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "up" | "lift" | "u" => Some(HardwareEvent::HookLifted),
        "down" | "hang" | "d" => Some(HardwareEvent::HookReplaced),
        _ => {
            let mut chars = line.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::new(c).map(HardwareEvent::KeyPressed),
                _ => None,
            }
        }
    }
}

/// Forward events from `reader` until it ends or the receiver is gone
pub fn read_console(reader: impl BufRead, events: &Sender<HardwareEvent>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "console input failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_console_line(&line) {
            Some(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            None => tracing::warn!(input = %line.trim(), "unrecognized console input"),
        }
    }
    tracing::debug!("console input closed");
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(parse_console_line("up"), Some(HardwareEvent::HookLifted));
        assert_eq!(parse_console_line(" DOWN "), Some(HardwareEvent::HookReplaced));
        assert_eq!(
            parse_console_line("#"),
            Some(HardwareEvent::KeyPressed(Key::new('#').unwrap()))
        );
        assert_eq!(parse_console_line("x"), None);
        assert_eq!(parse_console_line("12"), None);
    }

    #[test]
    fn test_reader_forwards_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        read_console(Cursor::new("up\n\nnonsense\n1\ndown\n"), &tx);
        drop(tx);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                HardwareEvent::HookLifted,
                HardwareEvent::KeyPressed(Key::new('1').unwrap()),
                HardwareEvent::HookReplaced,
            ]
        );
    }
}
