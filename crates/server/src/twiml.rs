//! TwiML rendering for voice gateway responses.

use parley_core::config::VoiceConfig;
use parley_core::domain::prompt::VoicePrompt;

pub const CONTENT_TYPE: &str = "application/xml";

/// Speech gather settings rendered onto `<Gather>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatherOptions {
    pub action: String,
    pub speech_timeout_secs: u32,
    pub language: String,
}

#[derive(Debug, Default)]
pub struct TwimlBuilder {
    body: String,
}

impl TwimlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: &str, voice: Option<&str>) -> Self {
        push_say(&mut self.body, text, voice);
        self
    }

    pub fn gather_speech(mut self, options: &GatherOptions, text: &str, voice: Option<&str>) -> Self {
        self.body.push_str(&format!(
            r#"<Gather input="speech" action="{}" method="POST" speechTimeout="{}" language="{}">"#,
            escape_xml(&options.action),
            options.speech_timeout_secs,
            escape_xml(&options.language)
        ));
        push_say(&mut self.body, text, voice);
        self.body.push_str("</Gather>");
        self
    }

    pub fn build(self) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><Response>{}</Response>"#, self.body)
    }
}

fn push_say(body: &mut String, text: &str, voice: Option<&str>) {
    match voice {
        Some(voice) => {
            body.push_str(&format!(r#"<Say voice="{}">"#, escape_xml(voice)));
        }
        None => body.push_str("<Say>"),
    }
    body.push_str(&escape_xml(text));
    body.push_str("</Say>");
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Renders a runtime prompt. Gathered prompts speak their fallback when no speech arrives.
pub fn render_prompt(prompt: &VoicePrompt, voice: &VoiceConfig) -> String {
    let tts_voice = Some(voice.tts_voice.as_str());
    match prompt {
        VoicePrompt::SpeakAndEnd { text } => TwimlBuilder::new().say(text, tts_voice).build(),
        VoicePrompt::SpeakAndGather { text, action, fallback } => {
            let options = GatherOptions {
                action: action.clone(),
                speech_timeout_secs: voice.speech_timeout_secs,
                language: voice.language.clone(),
            };
            let builder = TwimlBuilder::new().gather_speech(&options, text, tts_voice);
            match fallback {
                Some(fallback) => builder.say(fallback, None).build(),
                None => builder.build(),
            }
        }
    }
}
