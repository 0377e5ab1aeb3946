//! Deal workflow routes
//!
//! ```text
//! POST /api/deals                       create a deal
//! GET  /api/deals                       deals visible to the caller
//! GET  /api/deals/{id}                  deal graph
//! POST /api/deals/{id}/participants     upsert a participant
//! POST /api/deals/{id}/documents        attach a document
//! POST /api/deals/{id}/stages           update stage checklist items
//! ```

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::{deal_error_response, json_response, method_not_allowed_response, parse_json};
use crate::deals::{
    CreateDealInput, DealGraph, DocumentInput, ParticipantInput, StageUpdate, UserContext,
    Warning,
};
use crate::server::AppState;
use crate::types::Result;

/// Parsed `/api/deals...` route
#[derive(Debug, PartialEq, Eq)]
enum DealRoute<'a> {
    Collection,
    Deal(&'a str),
    Participants(&'a str),
    Documents(&'a str),
    Stages(&'a str),
}

impl<'a> DealRoute<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix("/api/deals")?.trim_end_matches('/');
        if rest.is_empty() {
            return Some(Self::Collection);
        }
        let rest = rest.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [id] if !id.is_empty() => Some(Self::Deal(id)),
            [id, "participants"] if !id.is_empty() => Some(Self::Participants(id)),
            [id, "documents"] if !id.is_empty() => Some(Self::Documents(id)),
            [id, "stages"] if !id.is_empty() => Some(Self::Stages(id)),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct GraphResponse {
    #[serde(flatten)]
    graph: DealGraph,
    warnings: Vec<Warning>,
}

/// Handle an authenticated request under `/api/deals`.
/// Returns `None` when the path is not a deal route.
pub async fn handle_deals_request(
    state: &AppState,
    method: &Method,
    path: &str,
    user: &UserContext,
    body: &[u8],
) -> Option<Response<Full<Bytes>>> {
    let route = DealRoute::parse(path)?;
    let response = match dispatch(state, method, route, user, body).await {
        Ok(response) => response,
        Err(e) => deal_error_response(e),
    };
    Some(response)
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    route: DealRoute<'_>,
    user: &UserContext,
    body: &[u8],
) -> Result<Response<Full<Bytes>>> {
    let deals = &state.deals;

    let response = match (method, route) {
        (&Method::POST, DealRoute::Collection) => {
            let input: CreateDealInput = parse_json(body)?;
            let (deal, warnings) = deals.create_deal(user, input).await?.into_parts();
            json_response(
                StatusCode::CREATED,
                &json!({ "deal": deal, "warnings": warnings }),
            )
        }
        (&Method::GET, DealRoute::Collection) => {
            let (list, warnings) = deals.list_deals(user).await?.into_parts();
            json_response(
                StatusCode::OK,
                &json!({ "deals": list, "warnings": warnings }),
            )
        }
        (&Method::GET, DealRoute::Deal(id)) => {
            let (graph, warnings) = deals.get_deal_graph(user, id).await?.into_parts();
            json_response(StatusCode::OK, &GraphResponse { graph, warnings })
        }
        (&Method::POST, DealRoute::Participants(id)) => {
            let input: ParticipantInput = parse_json(body)?;
            let participant = deals.upsert_participant(user, id, input).await?;
            json_response(StatusCode::OK, &json!({ "participant": participant }))
        }
        (&Method::POST, DealRoute::Documents(id)) => {
            let input: DocumentInput = parse_json(body)?;
            let document = deals.attach_document(user, id, input).await?;
            json_response(StatusCode::CREATED, &json!({ "document": document }))
        }
        (&Method::POST, DealRoute::Stages(id)) => {
            let update: StageUpdate = parse_json(body)?;
            let (stage, warnings) = deals
                .update_stage_checklist(user, id, update)
                .await?
                .into_parts();
            json_response(
                StatusCode::OK,
                &json!({ "stage": stage, "warnings": warnings }),
            )
        }
        _ => method_not_allowed_response(),
    };
    Ok(response)
}
