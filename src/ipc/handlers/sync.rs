use crate::ipc::error::{engine_err, ok};
use crate::ipc::helpers::{required_str, session, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_status(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.engine.pending_sync(&class_id) {
        Ok(pending) => match to_json(req, &pending) {
            Ok(v) => ok(
                &req.id,
                json!({
                    "classId": class_id,
                    "remote": session.engine.gateway().remote_description(),
                    "pending": v
                }),
            ),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

async fn handle_flush(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.engine.flush_sync(&class_id).await {
        Ok(reports) => match to_json(req, &reports) {
            Ok(v) => ok(&req.id, json!({ "classId": class_id, "reports": v })),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sync.status" => Some(handle_status(state, req)),
        "sync.flush" => Some(handle_flush(state, req).await),
        _ => None,
    }
}
