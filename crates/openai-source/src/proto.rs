use chatzoo_model::AnswerRequest;
use serde::{Deserialize, Serialize};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CompletionChoice {
    pub message: AssistantMessage,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    // Usage-only chunks come with an empty list.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &AnswerRequest,
    config: &OpenAIConfig,
    stream: bool,
) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if !req.system_prompt.is_empty() {
        messages.push(Message::System {
            content: req.system_prompt.clone(),
        });
    }
    messages.push(Message::User {
        content: req.prompt.clone(),
    });
    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        stream,
    }
}

#[cfg(test)]
mod tests {
    use chatzoo_model::PersonaId;
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = AnswerRequest {
            persona: PersonaId::Cat,
            system_prompt: "You are a cat.".to_owned(),
            prompt: "Hello".to_owned(),
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();
        let body = serde_json::to_value(create_request(&request, &config, true))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "messages": [
                    { "role": "system", "content": "You are a cat." },
                    { "role": "user", "content": "Hello" },
                ],
                "stream": true,
            })
        );
    }

    #[test]
    fn test_skip_empty_system_prompt() {
        let request = AnswerRequest {
            persona: PersonaId::Goldfish,
            system_prompt: String::new(),
            prompt: "Hi".to_owned(),
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx").build();
        let body = create_request(&request, &config, false);
        assert_eq!(
            body.messages,
            vec![Message::User {
                content: "Hi".to_owned()
            }]
        );
    }

    #[test]
    fn test_parse_completion() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Meow!" },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();
        assert_eq!(
            completion.choices[0].message.content.as_deref(),
            Some("Meow!")
        );
    }
}
