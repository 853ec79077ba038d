//! TwiML Response Builder
//!
//! Twilio drives a voice call by fetching XML documents ("TwiML") from our
//! webhooks. This module builds the small subset of verbs the receptionist
//! needs: speaking text, gathering caller speech, redirecting, dialing and
//! hanging up.

use std::fmt::Write;

/// A single TwiML verb inside a `<Response>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    /// Speak the text to the caller using Twilio's text-to-speech.
    Say(String),
    /// Listen for caller speech and POST the transcription to `action`.
    Gather {
        action: String,
        timeout_secs: u32,
        prompt: Option<String>,
    },
    /// Fetch the next TwiML document from `url`.
    Redirect(String),
    /// Bridge the call to another phone number.
    Dial(String),
    Hangup,
}

/// A complete TwiML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TwimlResponse {
    verbs: Vec<Verb>,
}

impl TwimlResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speaks `text`; blank text adds nothing.
    pub fn say(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.verbs.push(Verb::Say(text));
        }
        self
    }

    /// Gathers speech, speaking `prompt` (if any and not blank) while listening.
    pub fn gather(mut self, action: impl Into<String>, timeout_secs: u32, prompt: Option<String>) -> Self {
        self.verbs.push(Verb::Gather {
            action: action.into(),
            timeout_secs,
            prompt: prompt.filter(|p| !p.trim().is_empty()),
        });
        self
    }

    pub fn redirect(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Redirect(url.into()));
        self
    }

    pub fn dial(mut self, number: impl Into<String>) -> Self {
        self.verbs.push(Verb::Dial(number.into()));
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    /// Renders the document as an XML string.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            // Writing into a String cannot fail.
            let _ = match verb {
                Verb::Say(text) => write!(xml, "<Say>{}</Say>", escape(text)),
                Verb::Gather {
                    action,
                    timeout_secs,
                    prompt,
                } => {
                    let _ = write!(
                        xml,
                        r#"<Gather input="speech" method="POST" speechTimeout="auto" timeout="{}" action="{}">"#,
                        timeout_secs,
                        escape(action)
                    );
                    if let Some(prompt) = prompt {
                        let _ = write!(xml, "<Say>{}</Say>", escape(prompt));
                    }
                    write!(xml, "</Gather>")
                }
                Verb::Redirect(url) => {
                    write!(xml, r#"<Redirect method="POST">{}</Redirect>"#, escape(url))
                }
                Verb::Dial(number) => write!(xml, "<Dial>{}</Dial>", escape(number)),
                Verb::Hangup => write!(xml, "<Hangup/>"),
            };
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Escapes the five XML special characters.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
