//! Incremental `text/event-stream` parsing

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type from the `event:` field; `None` for untyped data events
    pub event: Option<String>,
    /// Concatenated `data:` payload
    pub data: String,
}

/// Incremental SSE frame parser
///
/// Feed raw chunks as they arrive; complete events (terminated by a blank
/// line) are returned in order. Comment lines (leading `:`) are dropped.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning any events it completed
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(boundary) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..boundary + 2).collect();
            if let Some(event) = parse_frame(frame.trim_end_matches('\n')) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_frame(frame: &str) -> Option<SseEvent> {
    let mut event_type = None;
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim_start_matches(' ').to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }

    if event_type.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn typed_and_untyped_events() {
        let mut parser = SseParser::new();
        let events = parser.push("event: endpoint\ndata: /messages?session_id=abc\n\ndata: {\"x\":1}\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("endpoint"));
        assert_eq!(events[0].data, "/messages?session_id=abc");
        assert_eq!(events[1].event, None);
        assert_eq!(events[1].data, "{\"x\":1}");
    }

    #[test]
    fn partial_chunks_accumulate() {
        let mut parser = SseParser::new();
        assert!(parser.push("data: {\"partial\":").is_empty());
        let events = parser.push("true}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"partial\":true}");
    }

    #[test]
    fn comments_are_ignored() {
        let mut parser = SseParser::new();
        assert!(parser.push(": keepalive\n\n").is_empty());
        let events = parser.push(": note\ndata: payload\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "payload");
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.push("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }
}
