//! Receptionist Core
//!
//! Domain logic for the voice receptionist: the conversational agent, the
//! LLM client it talks to, the actions it may invoke mid-call, and the
//! Twilio client those actions use for their side effects.

pub mod action;
pub mod agent;
pub mod llm_client;
pub mod nylas;
pub mod prompt;
pub mod twilio;
pub mod twiml;

pub use action::{Action, ActionConfig, ActionError, ActionFactory, ActionInput, ActionOutput, ActionType};
pub use agent::{Agent, AgentConfig, AgentFactory, AgentResponse, ChatAgentFactory, Transcript};
