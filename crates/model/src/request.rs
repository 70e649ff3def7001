use crate::PersonaId;

/// A request to be sent to an answer source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnswerRequest {
    /// The persona that should answer.
    pub persona: PersonaId,
    /// The instructions describing how the persona behaves.
    ///
    /// Sources backed by a real model should pass this along as the system
    /// message. Other sources are free to ignore it.
    pub system_prompt: String,
    /// The user input text.
    pub prompt: String,
}

/// A fully received answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompleteAnswer {
    /// The text of the answer.
    pub text: String,
}

impl CompleteAnswer {
    /// Creates an answer with the given text.
    #[inline]
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }
}
