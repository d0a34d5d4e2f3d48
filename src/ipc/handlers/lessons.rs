use crate::engine::TagChange;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{required_str, required_text, session, to_json};
use crate::ipc::types::{AppState, Request};
use crate::parser;
use serde_json::json;

async fn handle_load(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let loaded = session.engine.load(&class_id).await;
    let view = match to_json(req, &loaded.view) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "applied": loaded.applied, "view": view }))
}

fn handle_snapshot(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match to_json(req, &session.engine.snapshot()) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e,
    }
}

fn handle_activities(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match session.engine.activity_library() {
        Ok(activities) => match to_json(req, &activities) {
            Ok(v) => ok(&req.id, json!({ "activities": v })),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

async fn handle_import(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("rows") else {
        return err(&req.id, "bad_params", "missing rows", None);
    };
    let rows = match parser::rows_from_json(raw) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    match session.engine.import(&rows).await {
        Ok(outcome) => match to_json(req, &outcome) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

async fn handle_set_title(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_text(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.engine.set_title(&lesson_id, &title).await {
        Ok(lesson) => match to_json(req, &lesson) {
            Ok(v) => ok(&req.id, json!({ "lessonId": lesson_id, "lesson": v })),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

async fn handle_tag(state: &AppState, req: &Request, change: TagChange) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tag = match required_str(req, "tag") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session
        .engine
        .set_curriculum_tag(&lesson_id, &tag, change)
        .await
    {
        Ok(lesson) => ok(
            &req.id,
            json!({ "lessonId": lesson_id, "curriculumTags": lesson.curriculum_tags }),
        ),
        Err(e) => engine_err(&req.id, e),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lessons.load" => Some(handle_load(state, req).await),
        "lessons.snapshot" => Some(handle_snapshot(state, req)),
        "lessons.activities" => Some(handle_activities(state, req)),
        "lessons.import" => Some(handle_import(state, req).await),
        "lessons.setTitle" => Some(handle_set_title(state, req).await),
        "lessons.tags.add" => Some(handle_tag(state, req, TagChange::Add).await),
        "lessons.tags.remove" => Some(handle_tag(state, req, TagChange::Remove).await),
        _ => None,
    }
}
