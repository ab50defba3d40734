//! Mode-specific system prompts and reply post-processing.
//!
//! Prompts describe the expected reply shape to the provider; nothing here
//! enforces that shape.

use super::message::Mode;

const CHAT_PROMPT: &str = "\
You are a conversational AI assistant. Answer naturally and engagingly, \
use emojis where they fit, and structure longer answers with clear headings.";

const DOCUMENTS_PROMPT: &str = "\
You are an expert in document analysis. Analyze the provided content and produce:
- An executive summary
- The main key points
- Actionable recommendations
- An assessment of the overall sentiment";

const CODE_PROMPT: &str = "\
You are an expert software engineer. Produce high-quality code with:
- Explanatory comments
- Established best practices
- Error handling
- Unit tests where appropriate
- Inline documentation";

const AUDIO_PROMPT: &str = "\
You are an expert in writing audio scripts. Produce a script optimized for narration with:
- Natural timing and pauses
- Suggested intonation
- A clear, engaging structure
- Smooth transitions";

/// The system prompt sent with primary-provider requests in `mode`.
///
/// [`Mode::Error`] is never a user-chosen mode; it falls back to chat.
pub fn system_prompt(mode: Mode) -> &'static str {
    match mode {
        Mode::Chat | Mode::Error => CHAT_PROMPT,
        Mode::Documents => DOCUMENTS_PROMPT,
        Mode::Code => CODE_PROMPT,
        Mode::Audio => AUDIO_PROMPT,
    }
}

/// Adjust provider output for the mode it was produced in.
///
/// Audio replies get SSML break markers after punctuation so a TTS engine
/// pauses naturally; every other mode passes through unchanged.
pub fn post_process(content: &str, mode: Mode) -> String {
    match mode {
        Mode::Audio => add_speech_breaks(content),
        Mode::Chat | Mode::Documents | Mode::Code | Mode::Error => content.to_string(),
    }
}

fn add_speech_breaks(content: &str) -> String {
    let mut out = String::with_capacity(content.len() * 2);
    for c in content.chars() {
        out.push(c);
        let pause = match c {
            '.' => "0.5s",
            ',' => "0.3s",
            '?' | '!' => "0.7s",
            _ => continue,
        };
        out.push_str(" <break time=\"");
        out.push_str(pause);
        out.push_str("\"/>");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_a_prompt() {
        for mode in Mode::ALL {
            assert!(!system_prompt(mode).is_empty());
        }
        assert_eq!(system_prompt(Mode::Error), system_prompt(Mode::Chat));
        assert!(system_prompt(Mode::Documents).contains("executive summary"));
    }

    #[test]
    fn audio_gets_break_markers() {
        assert_eq!(
            post_process("Hi, there. Ready?", Mode::Audio),
            "Hi, <break time=\"0.3s\"/> there. <break time=\"0.5s\"/> Ready? <break time=\"0.7s\"/>"
        );
    }

    #[test]
    fn other_modes_pass_through() {
        let text = "fn main() { println!(\"hi\"); }";
        assert_eq!(post_process(text, Mode::Code), text);
        assert_eq!(post_process("Hello, world.", Mode::Chat), "Hello, world.");
    }
}
