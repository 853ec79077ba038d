//! Integration tests for the Twilio webhook routes.
//!
//! Tests:
//! - `POST /inbound_call` greets the caller and stores the call
//! - `POST /inbound_call/{id}/speech` runs one agent turn
//! - goodbye hangs up and forgets the call
//! - agent failures are answered with an apology
//! - `POST /inbound_call/status` cleans up finished calls
//! - a hang-up during an agent turn is not undone by the turn
//! - webhooks for another Twilio account are rejected
//! - unsigned or tampered webhooks are rejected when signatures are checked

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use receptionist_api::{
    config_manager::{ConfigManager, InMemoryConfigManager},
    events::{CallEvent, EventsManager},
    router::{TelephonyServer, create_router},
    state::InboundCallConfig,
};
use receptionist_core::{
    action::{ActionOutput, ActionType},
    agent::{Agent, AgentConfig, AgentFactory, AgentResponse, Speaker, Transcript, TurnContext},
    twilio::{TwilioConfig, request_signature},
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tower::ServiceExt;

const AUTH_TOKEN: &str = "secret";

/// Answers every utterance by echoing it; "bye" ends the call, "explode" fails,
/// "hold on" waits for the test to release it.
struct EchoAgent {
    seen_transcripts: Arc<Mutex<Vec<Transcript>>>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Agent for EchoAgent {
    async fn respond(
        &self,
        transcript: &Transcript,
        human_input: &str,
        turn: &TurnContext,
    ) -> Result<AgentResponse> {
        self.seen_transcripts.lock().unwrap().push(transcript.clone());
        assert_eq!(turn.call_sid.as_deref(), Some("CA1"));

        match human_input {
            "explode" => Err(anyhow!("LLM unavailable")),
            "hold on" => {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(AgentResponse {
                    text: "Thanks for waiting.".to_string(),
                    end_conversation: false,
                    actions: vec![],
                })
            }
            "say nothing" => Ok(AgentResponse {
                text: String::new(),
                end_conversation: false,
                actions: vec![],
            }),
            "bye" => Ok(AgentResponse {
                text: "Thanks for calling, goodbye".to_string(),
                end_conversation: true,
                actions: vec![],
            }),
            "book it" => Ok(AgentResponse {
                text: "I've sent you a text.".to_string(),
                end_conversation: false,
                actions: vec![ActionOutput {
                    action_type: ActionType::TwilioScheduleAppointment,
                    response: serde_json::json!({"success": true}),
                }],
            }),
            other => Ok(AgentResponse {
                text: format!("You said {other}"),
                end_conversation: false,
                actions: vec![],
            }),
        }
    }
}

struct EchoAgentFactory {
    seen_transcripts: Arc<Mutex<Vec<Transcript>>>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl AgentFactory for EchoAgentFactory {
    fn create_agent(&self, _config: &AgentConfig) -> Result<Box<dyn Agent>> {
        Ok(Box::new(EchoAgent {
            seen_transcripts: self.seen_transcripts.clone(),
            entered: self.entered.clone(),
            release: self.release.clone(),
        }))
    }
}

struct Harness {
    app: axum::Router,
    config_manager: Arc<InMemoryConfigManager>,
    events: Arc<EventsManager>,
    seen_transcripts: Arc<Mutex<Vec<Transcript>>>,
    agent_entered: Arc<Notify>,
    release_agent: Arc<Notify>,
}

fn setup() -> Harness {
    setup_with_signatures(false)
}

fn setup_with_signatures(verify_signatures: bool) -> Harness {
    let config_manager = Arc::new(InMemoryConfigManager::default());
    let events = Arc::new(EventsManager::default());
    let seen_transcripts = Arc::new(Mutex::new(Vec::new()));
    let agent_entered = Arc::new(Notify::new());
    let release_agent = Arc::new(Notify::new());

    let mut agent_config = AgentConfig::new("You are a receptionist.");
    agent_config.initial_message = Some("Hello & welcome".to_string());

    let server = TelephonyServer::new(
        "abc123.ngrok.io".to_string(),
        config_manager.clone(),
        vec![InboundCallConfig {
            url: "/inbound_call".to_string(),
            agent_config,
            twilio_config: TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: AUTH_TOKEN.to_string(),
            },
            verify_signatures,
        }],
        Arc::new(EchoAgentFactory {
            seen_transcripts: seen_transcripts.clone(),
            entered: agent_entered.clone(),
            release: release_agent.clone(),
        }),
        events.clone(),
    );

    Harness {
        app: create_router(&server),
        config_manager,
        events,
        seen_transcripts,
        agent_entered,
        release_agent,
    }
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Signs `body` the way Twilio would for a request to `uri` on the public host.
fn signed_form_post(uri: &str, body: &str) -> Request<Body> {
    let params: Vec<(String, String)> = url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    let signature =
        request_signature(AUTH_TOKEN, &format!("https://abc123.ngrok.io{uri}"), &params).unwrap();
    let mut request = form_post(uri, body);
    request
        .headers_mut()
        .insert("X-Twilio-Signature", signature.parse().unwrap());
    request
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Starts a call and returns its conversation id.
async fn start_call(harness: &Harness) -> String {
    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call",
            "CallSid=CA1&AccountSid=AC123&From=%2B15550001111&To=%2B15550002222",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    harness
        .config_manager
        .find_by_call_sid("CA1")
        .await
        .unwrap()
        .expect("call config should be stored")
        .conversation_id
}

#[tokio::test]
async fn test_health() {
    let harness = setup();
    let response = harness
        .app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_inbound_call_greets_and_gathers() {
    let harness = setup();
    let mut events = harness.events.subscribe();

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call",
            "CallSid=CA1&AccountSid=AC123&From=%2B15550001111&To=%2B15550002222",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml"
    );
    let xml = body_text(response).await;

    let call = harness
        .config_manager
        .find_by_call_sid("CA1")
        .await
        .unwrap()
        .unwrap();
    let speech_url = format!(
        "https://abc123.ngrok.io/inbound_call/{}/speech",
        call.conversation_id
    );
    assert!(xml.contains(&format!(r#"action="{speech_url}""#)));
    assert!(xml.contains("<Say>Hello &amp; welcome</Say>"));
    assert!(xml.contains(&format!(r#"<Redirect method="POST">{speech_url}</Redirect>"#)));

    assert_eq!(call.from_phone.as_deref(), Some("+15550001111"));
    assert_eq!(call.transcript.entries().len(), 1);
    assert_eq!(call.transcript.entries()[0].speaker, Speaker::Bot);

    assert!(matches!(
        events.recv().await.unwrap(),
        CallEvent::CallStarted { .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        CallEvent::BotTurn { .. }
    ));
}

#[tokio::test]
async fn test_speech_runs_agent_turn_and_records_transcript() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&AccountSid=AC123&SpeechResult=I+need+an+appointment&Confidence=0.92",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert!(xml.contains("<Say>You said I need an appointment</Say></Gather>"));

    // The agent saw the transcript before this turn.
    let seen = harness.seen_transcripts.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].entries().len(), 1);

    let call = harness
        .config_manager
        .get_config(&conversation_id)
        .await
        .unwrap()
        .unwrap();
    let speakers: Vec<Speaker> = call.transcript.entries().iter().map(|e| e.speaker).collect();
    assert_eq!(speakers, vec![Speaker::Bot, Speaker::Human, Speaker::Bot]);
}

#[tokio::test]
async fn test_action_results_are_published() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;
    let mut events = harness.events.subscribe();

    harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&SpeechResult=book+it",
        ))
        .await
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        CallEvent::HumanTurn { .. }
    ));
    match events.recv().await.unwrap() {
        CallEvent::ActionCompleted { action_type, .. } => {
            assert_eq!(action_type, ActionType::TwilioScheduleAppointment)
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_silence_reprompts_without_agent_turn() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&AccountSid=AC123",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert!(xml.contains("<Gather"));
    assert!(harness.seen_transcripts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_goodbye_hangs_up_and_forgets_call() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&SpeechResult=bye",
        ))
        .await
        .unwrap();

    let xml = body_text(response).await;
    assert!(xml.contains("<Say>Thanks for calling, goodbye</Say><Hangup/>"));
    assert!(!xml.contains("<Gather"));
    assert!(
        harness
            .config_manager
            .get_config(&conversation_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_agent_failure_apologizes_and_keeps_listening() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&SpeechResult=explode",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let xml = body_text(response).await;
    assert!(xml.contains("Sorry, I had trouble with that."));
    assert!(xml.contains("<Gather"));

    let call = harness
        .config_manager
        .get_config(&conversation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(call.transcript.entries().len(), 2);
}

#[tokio::test]
async fn test_speech_for_unknown_conversation_is_not_found() {
    let harness = setup();
    let response = harness
        .app
        .oneshot(form_post(
            "/inbound_call/does-not-exist/speech",
            "CallSid=CA1&SpeechResult=hello",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_foreign_account_is_forbidden() {
    let harness = setup();
    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call",
            "CallSid=CA1&AccountSid=AC999&From=%2B15550001111",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        harness
            .config_manager
            .find_by_call_sid("CA1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_completed_status_removes_call() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;
    let mut events = harness.events.subscribe();

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call/status",
            "CallSid=CA1&AccountSid=AC123&CallStatus=completed",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        harness
            .config_manager
            .get_config(&conversation_id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CallEvent::CallEnded {
            conversation_id,
            reason: "completed".to_string(),
        }
    );
}

#[tokio::test]
async fn test_in_progress_status_keeps_call() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call/status",
            "CallSid=CA1&CallStatus=in-progress",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        harness
            .config_manager
            .get_config(&conversation_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_empty_agent_reply_is_not_spoken() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&SpeechResult=say+nothing",
        ))
        .await
        .unwrap();

    let xml = body_text(response).await;
    assert!(xml.contains("<Gather"));
    assert!(!xml.contains("<Say>"));
}

#[tokio::test]
async fn test_hangup_during_agent_turn_does_not_restore_call() {
    let harness = setup();
    let conversation_id = start_call(&harness).await;

    let turn = tokio::spawn(harness.app.clone().oneshot(form_post(
        &format!("/inbound_call/{conversation_id}/speech"),
        "CallSid=CA1&SpeechResult=hold+on",
    )));
    harness.agent_entered.notified().await;

    let status = harness
        .app
        .clone()
        .oneshot(form_post(
            "/inbound_call/status",
            "CallSid=CA1&CallStatus=completed",
        ))
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::NO_CONTENT);
    assert!(
        harness
            .config_manager
            .get_config(&conversation_id)
            .await
            .unwrap()
            .is_none()
    );

    harness.release_agent.notify_one();
    let response = turn.await.unwrap().unwrap();
    let xml = body_text(response).await;

    assert!(xml.contains("<Hangup/>"));
    assert!(!xml.contains("<Gather"));
    assert!(
        harness
            .config_manager
            .get_config(&conversation_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_signed_webhooks_are_accepted() {
    let harness = setup_with_signatures(true);

    let response = harness
        .app
        .clone()
        .oneshot(signed_form_post(
            "/inbound_call",
            "CallSid=CA1&AccountSid=AC123&From=%2B15550001111",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let conversation_id = harness
        .config_manager
        .find_by_call_sid("CA1")
        .await
        .unwrap()
        .unwrap()
        .conversation_id;

    // The handler still sees the form after the signature check read it.
    let response = harness
        .app
        .clone()
        .oneshot(signed_form_post(
            &format!("/inbound_call/{conversation_id}/speech"),
            "CallSid=CA1&AccountSid=AC123&SpeechResult=hello+there",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("You said hello there"));
}

#[tokio::test]
async fn test_unsigned_webhook_is_forbidden() {
    let harness = setup_with_signatures(true);

    let response = harness
        .app
        .clone()
        .oneshot(form_post("/inbound_call", "CallSid=CA1&AccountSid=AC123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        harness
            .config_manager
            .find_by_call_sid("CA1")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_tampered_webhook_is_forbidden() {
    let harness = setup_with_signatures(true);

    let mut request = signed_form_post("/inbound_call", "CallSid=CA1&AccountSid=AC123");
    *request.body_mut() = Body::from("CallSid=CA2&AccountSid=AC123");
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        harness
            .config_manager
            .find_by_call_sid("CA2")
            .await
            .unwrap()
            .is_none()
    );
}
