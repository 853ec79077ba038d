//! Axum Handlers for the Twilio Voice Webhooks
//!
//! A call is driven entirely by Twilio fetching TwiML from these handlers:
//! the inbound webhook greets the caller and starts listening, every
//! gathered utterance runs one agent turn, and the status callback cleans
//! up once the call is over.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    Form,
};
use chrono::Utc;
use receptionist_core::{
    agent::{Speaker, Transcript, TurnContext},
    twiml::TwimlResponse,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    events::CallEvent,
    models::{CallConfig, ErrorResponse, TwilioCallForm, TwilioSpeechForm, TwilioStatusForm},
    state::InboundRouteState,
};

/// Seconds Twilio waits for the caller to start speaking.
pub const GATHER_TIMEOUT_SECS: u32 = 5;

pub const APOLOGY_MESSAGE: &str = "Sorry, I had trouble with that. Could you say it again?";

pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// A TwiML document served with an XML content type.
pub struct Twiml(pub TwimlResponse);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/xml")],
            self.0.to_xml(),
        )
            .into_response()
    }
}

/// Rejects webhooks addressed to a different Twilio account.
fn check_account(route: &InboundRouteState, account_sid: Option<&str>) -> Result<(), ApiError> {
    match account_sid {
        Some(sid) if sid != route.inbound.twilio_config.account_sid => Err(ApiError::Forbidden(
            format!("Unexpected Twilio account '{}'", sid),
        )),
        _ => Ok(()),
    }
}

/// Speaks `text` (if any) while listening, then loops back if the caller stays silent.
fn listen(route: &InboundRouteState, conversation_id: &str, text: Option<String>) -> TwimlResponse {
    let speech_url = route.speech_url(conversation_id);
    TwimlResponse::new()
        .gather(&speech_url, GATHER_TIMEOUT_SECS, text)
        .redirect(speech_url)
}

/// Twilio voice webhook for a new inbound call.
#[instrument(skip_all, fields(call_sid = %form.call_sid))]
pub async fn inbound_call(
    State(route): State<InboundRouteState>,
    Form(form): Form<TwilioCallForm>,
) -> Result<Twiml, ApiError> {
    check_account(&route, form.account_sid.as_deref())?;

    let conversation_id = Uuid::new_v4().to_string();
    let agent_config = route.inbound.agent_config.clone();

    let mut transcript = Transcript::default();
    if let Some(initial) = &agent_config.initial_message {
        transcript.push(Speaker::Bot, initial.clone());
    }

    let call_config = CallConfig {
        conversation_id: conversation_id.clone(),
        call_sid: form.call_sid.clone(),
        from_phone: form.from.clone(),
        to_phone: form.to.clone(),
        agent_config: agent_config.clone(),
        transcript,
        created_at: Utc::now(),
    };
    route
        .app
        .config_manager
        .save_config(&conversation_id, call_config)
        .await?;

    info!(%conversation_id, from = ?form.from, "Inbound call accepted");
    let events = &route.app.events_manager;
    events.publish(CallEvent::CallStarted {
        conversation_id: conversation_id.clone(),
        call_sid: form.call_sid,
        from_phone: form.from,
        to_phone: form.to,
    });
    if let Some(initial) = &agent_config.initial_message {
        events.publish(CallEvent::BotTurn {
            conversation_id: conversation_id.clone(),
            text: initial.clone(),
        });
    }

    Ok(Twiml(listen(
        &route,
        &conversation_id,
        agent_config.initial_message,
    )))
}

/// Receives one gathered utterance and answers with the agent's reply.
#[instrument(skip_all, fields(%conversation_id))]
pub async fn speech(
    State(route): State<InboundRouteState>,
    Path(conversation_id): Path<String>,
    Form(form): Form<TwilioSpeechForm>,
) -> Result<Twiml, ApiError> {
    check_account(&route, form.account_sid.as_deref())?;

    let config_manager = &route.app.config_manager;
    let mut call_config = config_manager
        .get_config(&conversation_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Conversation '{}' not found", conversation_id))
        })?;

    let human_input = match form.speech_result.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => return Ok(Twiml(listen(&route, &conversation_id, None))),
    };
    info!(confidence = ?form.confidence, "Caller said: {}", human_input);

    let events = &route.app.events_manager;
    events.publish(CallEvent::HumanTurn {
        conversation_id: conversation_id.clone(),
        text: human_input.clone(),
    });

    let turn = TurnContext {
        conversation_id: conversation_id.clone(),
        call_sid: Some(call_config.call_sid.clone()),
    };
    let result = match route.app.agent_factory.create_agent(&call_config.agent_config) {
        Ok(agent) => {
            agent
                .respond(&call_config.transcript, &human_input, &turn)
                .await
        }
        Err(e) => Err(e),
    };

    call_config
        .transcript
        .push(Speaker::Human, human_input);

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            error!(error = ?e, "Agent turn failed");
            if !config_manager
                .update_config(&conversation_id, call_config)
                .await?
            {
                return Ok(call_already_ended());
            }
            return Ok(Twiml(listen(
                &route,
                &conversation_id,
                Some(APOLOGY_MESSAGE.to_string()),
            )));
        }
    };

    for output in &response.actions {
        events.publish(CallEvent::ActionCompleted {
            conversation_id: conversation_id.clone(),
            action_type: output.action_type,
            response: output.response.clone(),
        });
    }
    events.publish(CallEvent::BotTurn {
        conversation_id: conversation_id.clone(),
        text: response.text.clone(),
    });
    call_config
        .transcript
        .push(Speaker::Bot, response.text.clone());

    if response.end_conversation {
        if config_manager.delete_config(&conversation_id).await?.is_some() {
            events.publish(CallEvent::CallEnded {
                conversation_id,
                reason: "agent_hangup".to_string(),
            });
        }
        return Ok(Twiml(TwimlResponse::new().say(response.text).hangup()));
    }

    if !config_manager
        .update_config(&conversation_id, call_config)
        .await?
    {
        return Ok(call_already_ended());
    }
    Ok(Twiml(listen(&route, &conversation_id, Some(response.text))))
}

/// The call ended (or expired) while the agent was answering.
fn call_already_ended() -> Twiml {
    info!("Call ended during agent turn; discarding reply");
    Twiml(TwimlResponse::new().hangup())
}

/// Twilio call status callback; forgets the call once it is over.
#[instrument(skip_all, fields(call_sid = %form.call_sid, status = %form.call_status))]
pub async fn call_status(
    State(route): State<InboundRouteState>,
    Form(form): Form<TwilioStatusForm>,
) -> Result<StatusCode, ApiError> {
    check_account(&route, form.account_sid.as_deref())?;

    if !form.is_terminal() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let config_manager = &route.app.config_manager;
    match config_manager.find_by_call_sid(&form.call_sid).await? {
        Some(call_config) => {
            config_manager
                .delete_config(&call_config.conversation_id)
                .await?;
            info!(conversation_id = %call_config.conversation_id, "Call finished");
            route.app.events_manager.publish(CallEvent::CallEnded {
                conversation_id: call_config.conversation_id,
                reason: form.call_status,
            });
        }
        None => warn!("Status callback for unknown call"),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness check.
pub async fn health() -> StatusCode {
    StatusCode::OK
}
