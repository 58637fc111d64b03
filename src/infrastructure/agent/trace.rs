//! Parses an agent's combined stdout/stderr into a subagent trace.
//! Agents emit one JSON object per line matching
//! `SubagentTraceEvent`'s own tagged shape (`{"kind": "spawned", ...}`
//! etc.); anything that doesn't parse is kept verbatim as a `Text` event
//! rather than dropped, so raw CLI chatter is still visible in the trace.

use crate::domain::models::iteration_result::SubagentTraceEvent;

pub fn parse(output: &str) -> Vec<SubagentTraceEvent> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<SubagentTraceEvent>(line.trim()).unwrap_or_else(|_| {
                SubagentTraceEvent::Text {
                    text: line.to_string(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_mix_of_structured_and_plain_lines() {
        let output = "plain line\n{\"kind\":\"spawned\",\"name\":\"reviewer\",\"description\":\"check diff\"}\n{\"kind\":\"completed\",\"name\":\"reviewer\",\"success\":true}\n";
        let events = parse(output);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SubagentTraceEvent::Text { .. }));
        assert!(matches!(events[1], SubagentTraceEvent::Spawned { .. }));
        assert!(matches!(events[2], SubagentTraceEvent::Completed { success: true, .. }));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let events = parse("\n\n  \n");
        assert!(events.is_empty());
    }
}
