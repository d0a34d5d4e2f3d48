use crate::gateway::SyncReport;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, session, to_json};
use crate::ipc::types::{AppState, Request};
use crate::tags::TagCatalog;
use serde_json::json;

fn catalog_result(
    req: &Request,
    result: anyhow::Result<(TagCatalog, Vec<SyncReport>)>,
) -> serde_json::Value {
    match result {
        Ok((catalog, sync)) => {
            let catalog = match to_json(req, &catalog) {
                Ok(v) => v,
                Err(e) => return e,
            };
            let sync = match to_json(req, &sync) {
                Ok(v) => v,
                Err(e) => return e,
            };
            ok(&req.id, json!({ "catalog": catalog, "sync": sync }))
        }
        Err(e) => err(&req.id, "storage_failed", format!("{e:#}"), None),
    }
}

async fn handle_load(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let catalog = session.tags.load(&class_id).await;
    match to_json(req, &catalog) {
        Ok(v) => ok(&req.id, json!({ "catalog": v })),
        Err(e) => e,
    }
}

async fn handle_edit(state: &AppState, req: &Request, add: bool) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tag = match required_str(req, "tag") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let result = if add {
        session.tags.add(&class_id, &tag).await
    } else {
        session.tags.remove(&class_id, &tag).await
    };
    catalog_result(req, result)
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.load" => Some(handle_load(state, req).await),
        "curriculum.add" => Some(handle_edit(state, req, true).await),
        "curriculum.remove" => Some(handle_edit(state, req, false).await),
        _ => None,
    }
}
