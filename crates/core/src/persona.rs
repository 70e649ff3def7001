//! The persona registry.

use chatzoo_model::PersonaId;
use serde::Serialize;

/// How the replies of a persona are shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealProfile {
    /// The reply shows up as soon as it's received.
    Instant,
    /// The reply is revealed bit by bit, following the pacing policy.
    Paced,
}

/// Which operation of the answer source a persona asks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// One complete answer.
    Complete,
    /// An answer delivered as fragments.
    Streaming,
}

/// Display metadata and behavior of a persona.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub id: PersonaId,
    pub display_name: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub reveal_profile: RevealProfile,
    pub answer_mode: AnswerMode,
}

static PERSONAS: [Persona; 3] = [
    Persona {
        id: PersonaId::Cat,
        display_name: "Catalina ᓚᘏᗢ",
        emoji: "😺",
        description: "Replies only in meows and cat emojis.",
        system_prompt: "You are a cat. You can only respond with various \
            'meows' and cat-related emojis like 😺, 😸, 😹, 😻, 😼, 😽, 🙀, \
            😿, 😾, 🐾, ᓚᘏᗢ. Your responses should be short and expressive \
            of cat behavior.",
        reveal_profile: RevealProfile::Instant,
        answer_mode: AnswerMode::Complete,
    },
    Persona {
        id: PersonaId::Goldfish,
        display_name: "Goldie the Goldfish",
        emoji: "🐠",
        description: "Has the memory of a goldfish. No recollection of past \
            conversations.",
        system_prompt: "You are a friendly chatbot with the memory of a \
            goldfish. You cannot remember any previous parts of the \
            conversation. Respond to every prompt as if it's the very first \
            one you've ever seen. Keep your answers concise, cheerful, and \
            slightly forgetful.",
        reveal_profile: RevealProfile::Instant,
        answer_mode: AnswerMode::Complete,
    },
    Persona {
        id: PersonaId::Sloth,
        display_name: "Sid the Sloth",
        emoji: "🦥",
        description: "Responds very... very... slowly... one... letter... \
            at... a... time.",
        system_prompt: "You are a wise and thoughtful sloth. Respond to \
            prompts very, very slowly and deliberately. Your answers should \
            be simple, profound, and delivered at a leisurely pace, often \
            with pauses indicated by ellipses.",
        reveal_profile: RevealProfile::Paced,
        answer_mode: AnswerMode::Streaming,
    },
];

/// Returns the persona registered for `id`.
#[inline]
pub fn persona(id: PersonaId) -> &'static Persona {
    match id {
        PersonaId::Cat => &PERSONAS[0],
        PersonaId::Goldfish => &PERSONAS[1],
        PersonaId::Sloth => &PERSONAS[2],
    }
}

/// Returns all personas, in display order.
#[inline]
pub fn personas() -> &'static [Persona] {
    &PERSONAS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_ids() {
        assert_eq!(personas().len(), PersonaId::ALL.len());
        for id in PersonaId::ALL {
            assert_eq!(persona(id).id, id);
        }
    }

    #[test]
    fn test_only_sloth_is_paced() {
        for persona in personas() {
            let paced = persona.reveal_profile == RevealProfile::Paced;
            assert_eq!(paced, persona.id == PersonaId::Sloth);
        }
        assert_eq!(persona(PersonaId::Sloth).answer_mode, AnswerMode::Streaming);
    }
}
