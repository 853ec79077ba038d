//! Receptionist Agent
//!
//! This module implements the chat-completion-backed conversational agent
//! that answers callers. The agent is stateless between turns: every turn
//! receives the call transcript so far, which lets the telephony layer keep
//! per-call state in a serializable record instead of a live object.

use crate::{
    action::{Action, ActionConfig, ActionFactory, ActionInput, ActionOutput},
    llm_client::{CompletionSettings, LLMAction, LLMClient, LLMStreamEvent},
};
use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionToolArgs,
    FunctionObjectArgs,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Configuration for a chat-completion agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Spoken as soon as the call connects.
    pub initial_message: Option<String>,
    /// System prompt steering the conversation.
    pub prompt_preamble: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Actions the agent may invoke through tool calling.
    pub actions: Vec<ActionConfig>,
    /// Hang up once the agent itself says goodbye.
    pub end_conversation_on_goodbye: bool,
}

impl AgentConfig {
    pub fn new(prompt_preamble: impl Into<String>) -> Self {
        Self {
            initial_message: None,
            prompt_preamble: prompt_preamble.into(),
            model_name: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            actions: Vec::new(),
            end_conversation_on_goodbye: false,
        }
    }

    fn completion_settings(&self) -> CompletionSettings {
        CompletionSettings {
            model: self.model_name.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Bot,
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// The ordered turns of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifies the call a turn belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    pub conversation_id: String,
    pub call_sid: Option<String>,
}

/// What the agent produced for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub text: String,
    pub end_conversation: bool,
    /// Actions completed while producing this response, in call order.
    pub actions: Vec<ActionOutput>,
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn respond(
        &self,
        transcript: &Transcript,
        human_input: &str,
        turn: &TurnContext,
    ) -> Result<AgentResponse>;
}

/// Constructs agents from configuration.
pub trait AgentFactory: Send + Sync {
    fn create_agent(&self, config: &AgentConfig) -> Result<Box<dyn Agent>>;
}

/// Builds [`ChatAgent`]s wired to a shared LLM client and action factory.
pub struct ChatAgentFactory {
    llm_client: Arc<dyn LLMClient>,
    action_factory: Arc<dyn ActionFactory>,
}

impl ChatAgentFactory {
    pub fn new(llm_client: Arc<dyn LLMClient>, action_factory: Arc<dyn ActionFactory>) -> Self {
        Self {
            llm_client,
            action_factory,
        }
    }
}

impl AgentFactory for ChatAgentFactory {
    fn create_agent(&self, config: &AgentConfig) -> Result<Box<dyn Agent>> {
        let actions = config
            .actions
            .iter()
            .map(|action_config| self.action_factory.create_action(action_config))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to build agent actions")?;

        Ok(Box::new(ChatAgent {
            config: config.clone(),
            llm_client: self.llm_client.clone(),
            actions,
        }))
    }
}

/// A chat-completion agent that may call actions mid-turn.
pub struct ChatAgent {
    config: AgentConfig,
    llm_client: Arc<dyn LLMClient>,
    actions: Vec<Arc<dyn Action>>,
}

impl ChatAgent {
    fn build_messages(
        &self,
        transcript: &Transcript,
        human_input: &str,
    ) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.config.prompt_preamble.clone())
                .build()?
                .into(),
        ];
        for entry in transcript.entries() {
            match entry.speaker {
                Speaker::Human => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(entry.text.clone())
                        .build()?
                        .into(),
                ),
                Speaker::Bot => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(entry.text.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(human_input)
                .build()?
                .into(),
        );
        Ok(messages)
    }

    fn tools(&self) -> Result<Vec<ChatCompletionTool>> {
        self.actions
            .iter()
            .map(|action| {
                Ok(ChatCompletionToolArgs::default()
                    .function(
                        FunctionObjectArgs::default()
                            .name(action.action_type().as_str())
                            .description(action.description())
                            .parameters(action.parameters_schema())
                            .build()?,
                    )
                    .build()?)
            })
            .collect()
    }

    fn find_action(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions
            .iter()
            .find(|action| action.action_type().as_str() == name)
    }
}

#[async_trait]
impl Agent for ChatAgent {
    #[instrument(skip_all, fields(conversation_id = %turn.conversation_id))]
    async fn respond(
        &self,
        transcript: &Transcript,
        human_input: &str,
        turn: &TurnContext,
    ) -> Result<AgentResponse> {
        let mut messages = self.build_messages(transcript, human_input)?;
        let settings = self.config.completion_settings();

        let decision = self
            .llm_client
            .decide_action(&settings, messages.clone(), self.tools()?)
            .await?;

        let mut completed = Vec::new();
        let text = match decision {
            LLMAction::TextResponse(text) => text,
            LLMAction::ToolCall(tool_calls) => {
                messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .tool_calls(tool_calls.clone())
                        .build()?
                        .into(),
                );

                for call in &tool_calls {
                    let action = self
                        .find_action(&call.function.name)
                        .with_context(|| format!("LLM called unknown action '{}'", call.function.name))?;
                    // Arguments that are not JSON are handed over as a raw string.
                    let params = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));

                    info!(action = %call.function.name, "Running action");
                    let output = action
                        .run(ActionInput {
                            conversation_id: turn.conversation_id.clone(),
                            call_sid: turn.call_sid.clone(),
                            params,
                        })
                        .await
                        .with_context(|| format!("Action '{}' failed", call.function.name))?;

                    messages.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .tool_call_id(call.id.clone())
                            .content(serde_json::to_string(&output.response)?)
                            .build()?
                            .into(),
                    );
                    completed.push(output);
                }

                let mut stream = self
                    .llm_client
                    .stream_after_tools(&settings, messages)
                    .await?;
                let mut full_response = String::new();
                while let Some(event) = stream.next().await {
                    let LLMStreamEvent::TextChunk(chunk) = event?;
                    full_response.push_str(&chunk);
                }
                full_response
            }
        };

        let end_conversation = self.config.end_conversation_on_goodbye && says_goodbye(&text);
        debug!(chars = text.len(), end_conversation, "Agent turn complete");

        Ok(AgentResponse {
            text,
            end_conversation,
            actions: completed,
        })
    }
}

/// True when the text contains a standalone "goodbye" or "bye".
pub fn says_goodbye(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("goodbye") || word.eq_ignore_ascii_case("bye"))
}
