//! Request dispatch: raw text frame in, one broadcast response out.
//!
//! # Flows
//!
//! | Request       | Steps                                                   |
//! |---------------|---------------------------------------------------------|
//! | `connect`     | acquire board                                           |
//! | `call`        | acquire board → get component → invoke function         |
//! | `listenevent` | acquire board → get component → subscribe              |
//!
//! Whatever happens along a flow, exactly one response is produced and it is
//! broadcast to every open connection.  Failures become error responses; they
//! never escape [`RequestRouter::handle`].
//!
//! Requests are independent: the infrastructure layer runs each one on its own
//! task, so a request waiting for a slow board does not hold up requests for
//! other boards.  Responses therefore go out in completion order.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::application::context::RelayContext;
use crate::application::error::RelayError;
use crate::domain::messages::{CallRequest, ListenEventRequest, Outbound, Request};

/// Decodes, runs and answers requests against a shared [`RelayContext`].
///
/// Cloning is cheap and every clone routes against the same context.
#[derive(Clone)]
pub struct RequestRouter {
    context: Arc<RelayContext>,
}

impl RequestRouter {
    pub fn new(context: Arc<RelayContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Handles one inbound text frame.
    ///
    /// The response is broadcast to every open connection and also returned,
    /// which is what tests and the HTTP echo path look at.
    pub async fn handle(&self, raw: &str) -> Outbound {
        let outbound = match decode(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(failure) => failure,
        };
        self.context.broadcaster().broadcast(&outbound);
        outbound
    }

    /// Runs a decoded request and converts its outcome into a response.
    pub async fn dispatch(&self, request: Request) -> Outbound {
        debug!(
            "dispatching {} {} for board {}",
            request.type_name(),
            request.id(),
            request.board()
        );

        let outcome = match &request {
            Request::Connect(connect) => self.connect(&connect.board).await,
            Request::Call(call) => self.call(call).await,
            Request::ListenEvent(listen) => self.listen_event(listen).await,
        };

        match outcome {
            Ok(resp) => Outbound::success(request.id(), resp),
            Err(err) => {
                warn!(
                    "{} {} for board {} failed: {err}",
                    request.type_name(),
                    request.id(),
                    request.board()
                );
                Outbound::failure(Some(request.id().to_string()), err.status(), err.detail())
            }
        }
    }

    async fn connect(&self, board: &str) -> Result<Option<Value>, RelayError> {
        self.context.registry().acquire(board).await?;
        Ok(None)
    }

    async fn call(&self, call: &CallRequest) -> Result<Option<Value>, RelayError> {
        let session = self.context.registry().acquire(&call.board).await?;
        let component = session
            .components()
            .get(&call.component, &call.component_args)?;
        let resp = component.invoke(&call.function, &call.function_args)?;
        Ok(Some(resp))
    }

    async fn listen_event(&self, listen: &ListenEventRequest) -> Result<Option<Value>, RelayError> {
        let session = self.context.registry().acquire(&listen.board).await?;
        let component = session
            .components()
            .get(&listen.component, &listen.component_args)?;
        component.subscribe(
            &listen.event_id,
            &listen.event_name,
            self.context.broadcaster(),
        )?;
        Ok(None)
    }
}

/// Decodes a text frame into a [`Request`].
///
/// # Errors
///
/// Returns the status-400 response to send instead.  It echoes the request
/// `id` whenever the frame was a JSON object with a string `id`, even if the
/// rest of it was unusable.
pub fn decode(raw: &str) -> Result<Request, Outbound> {
    let value: Value = serde_json::from_str(raw).map_err(|e| decode_failure(None, e))?;
    let id = value.get("id").and_then(Value::as_str).map(str::to_string);
    serde_json::from_value(value).map_err(|e| decode_failure(id, e))
}

fn decode_failure(id: Option<String>, err: serde_json::Error) -> Outbound {
    let err = RelayError::Decode(err.to_string());
    warn!("rejecting request: {err}");
    Outbound::failure(id, err.status(), err.detail())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
