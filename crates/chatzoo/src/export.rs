use chatzoo_core::Session;
use chatzoo_core::persona::persona;
use chatzoo_core::store::Message;
use chatzoo_model::PersonaId;
use serde::Serialize;

/// A conversation with one persona, as exported by `/export`.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationExport {
    /// The persona talked to.
    pub persona: PersonaId,
    /// The display name of the persona.
    pub display_name: &'static str,
    /// The messages, oldest first.
    pub messages: Vec<Message>,
}

/// Serializes the conversation with `persona` as pretty-printed JSON.
pub fn export_conversation(
    session: &Session,
    persona_id: PersonaId,
) -> Result<String, serde_json::Error> {
    let export = ConversationExport {
        persona: persona_id,
        display_name: persona(persona_id).display_name,
        messages: session.conversation(persona_id),
    };
    serde_json::to_string_pretty(&export)
}

#[cfg(test)]
mod tests {
    use chatzoo_mock_source::{PresetAnswer, ScriptedSource};
    use chatzoo_core::SessionBuilder;
    use serde_json::{Value, json};

    use super::*;

    #[tokio::test]
    async fn test_export_conversation() {
        let mut source = ScriptedSource::default();
        source.set_answer(
            PersonaId::Goldfish,
            PresetAnswer::with_fragments(["Blub!"]),
        );
        let session = SessionBuilder::with_answer_source(source)
            .with_initial_persona(PersonaId::Goldfish)
            .build();
        session.send_message("hi");
        session.idle().await;

        let exported =
            export_conversation(&session, PersonaId::Goldfish).unwrap();
        let mut value: Value = serde_json::from_str(&exported).unwrap();
        for msg in value["messages"].as_array_mut().unwrap() {
            assert!(msg["id"].is_string());
            msg.as_object_mut().unwrap().remove("id");
        }
        assert_eq!(
            value,
            json!({
                "persona": "goldfish",
                "display_name": "Goldie the Goldfish",
                "messages": [
                    {
                        "role": "user",
                        "persona": "goldfish",
                        "text": "hi",
                        "reveal_state": "complete",
                    },
                    {
                        "role": "assistant",
                        "persona": "goldfish",
                        "text": "Blub!",
                        "reveal_state": "complete",
                    },
                ],
            })
        );
    }
}
