use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub async fn handle_request(state: &AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::lessons::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::plans::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::curriculum::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::sync::try_handle(state, &req).await {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
