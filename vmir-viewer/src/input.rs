//! Console command → in-scene shortcut conversion.
//!
//! Stands in for the raw-device input collaborator: each line on
//! stdin maps to one [`ControlEvent`], mirroring the in-scene keyboard
//! shortcuts (drag toggle, blacklist, scale up/down).

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use vmir_core::ControlEvent;

/// Parse one console line into a control event.
pub fn parse_command(line: &str) -> Option<ControlEvent> {
    match line.trim() {
        "drag" | "d" => Some(ControlEvent::ToggleDrag),
        "blacklist" | "b" => Some(ControlEvent::BlacklistFocused),
        "scale+" | "+" => Some(ControlEvent::ScaleFocused(1.1)),
        "scale-" | "-" => Some(ControlEvent::ScaleFocused(0.9)),
        "quit" | "q" | "exit" => Some(ControlEvent::Shutdown),
        "" => None,
        _ => {
            warn!(line, "unknown command (drag | blacklist | scale+ | scale- | quit)");
            None
        }
    }
}

/// Read stdin line by line and forward parsed events until the
/// service side hangs up or stdin closes.
pub async fn run_console(events: mpsc::Sender<ControlEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(event) = parse_command(&line) else {
            continue;
        };
        debug!(?event, "console command");
        if events.send(event).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_map_to_events() {
        assert_eq!(parse_command("drag"), Some(ControlEvent::ToggleDrag));
        assert_eq!(parse_command(" b "), Some(ControlEvent::BlacklistFocused));
        assert_eq!(parse_command("scale+"), Some(ControlEvent::ScaleFocused(1.1)));
        assert_eq!(parse_command("scale-"), Some(ControlEvent::ScaleFocused(0.9)));
        assert_eq!(parse_command("quit"), Some(ControlEvent::Shutdown));
    }

    #[test]
    fn noise_is_ignored() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("frobnicate"), None);
    }
}
