//! Chat template rendering for local models.
//!
//! Instruct models get ChatML turns; base models get the bare text so they
//! simply continue it.

use super::model_registry::ChatTemplate;
use super::runtime::{ChatMessage, Role};

/// Render role-tagged messages into prompt text.
///
/// ChatML format: `<|im_start|>role\n...<|im_end|>\n` per turn, ending with an
/// open `<|im_start|>assistant\n` turn for the model to fill.
pub fn render(template: ChatTemplate, messages: &[ChatMessage]) -> String {
    match template {
        ChatTemplate::ChatMl => render_chatml(messages),
        ChatTemplate::Plain => render_plain(messages),
    }
}

fn render_chatml(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(&format!(
            "<|im_start|>{}\n{}<|im_end|>\n",
            message.role.as_str(),
            message.content
        ));
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

fn render_plain(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
