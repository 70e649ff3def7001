use serde::{Deserialize, Serialize};

/// The events in a preset answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "fragment")]
    Fragment(String),
    /// Breaks the answer with an error carrying this message.
    #[serde(rename = "fail")]
    Fail(String),
}

/// The preset answer of one persona.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetAnswer {
    /// Events in this answer.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failures` attempts.
    /// `Some(0)` means the request will fail infinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures: Option<u64>,
}

impl PresetAnswer {
    /// Creates a `PresetAnswer` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Creates a `PresetAnswer` delivering each of `fragments` in order.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let events: Vec<_> = fragments
            .into_iter()
            .map(|s| PresetEvent::Fragment(s.into()))
            .collect();
        Self::with_events(events)
    }

    /// Sets failure times before a successful answer. `0` means the
    /// answer will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Returns `true` if the attempt numbered `attempt` (1-based) should
    /// be rejected.
    #[inline]
    pub(crate) fn fails_on(&self, attempt: u64) -> bool {
        match self.failures {
            None => false,
            Some(0) => true,
            Some(n) => attempt <= n,
        }
    }

    /// Joins all fragments, or returns the message of the first failure.
    pub(crate) fn full_text(&self) -> Result<String, &str> {
        let mut text = String::new();
        for event in &self.events {
            match event {
                PresetEvent::Fragment(fragment) => text.push_str(fragment),
                PresetEvent::Fail(message) => return Err(message),
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let answer = PresetAnswer::with_events([
            PresetEvent::Fragment("I have left a message ".to_string()),
            PresetEvent::Fail("connection reset".to_string()),
        ])
        .with_failures(2);

        let serialized = serde_json::to_string(&answer).unwrap();
        let deserialized: PresetAnswer =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(answer, deserialized);
    }

    #[test]
    fn test_deserialize_without_failures() {
        let answer: PresetAnswer = serde_json::from_str(
            r#"{"events":[{"type":"fragment","data":"Meow"}]}"#,
        )
        .unwrap();
        assert_eq!(answer, PresetAnswer::with_fragments(["Meow"]));
    }

    #[test]
    fn test_failure_schedule() {
        let answer = PresetAnswer::with_fragments(["ok"]);
        assert!(!answer.fails_on(1));

        let answer = answer.with_failures(2);
        assert!(answer.fails_on(1));
        assert!(answer.fails_on(2));
        assert!(!answer.fails_on(3));

        let answer = answer.with_failures(0);
        assert!(answer.fails_on(100));
    }

    #[test]
    fn test_full_text() {
        let answer = PresetAnswer::with_fragments(["S", "l", "o", "w"]);
        assert_eq!(answer.full_text(), Ok("Slow".to_owned()));

        let answer = PresetAnswer::with_events([
            PresetEvent::Fragment("S".to_owned()),
            PresetEvent::Fail("boom".to_owned()),
        ]);
        assert_eq!(answer.full_text(), Err("boom"));
    }
}
