use serde_json::json;

use crate::engine::EngineError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn engine_err(id: &str, e: EngineError) -> serde_json::Value {
    match e {
        EngineError::NoActiveClass => err(id, "no_active_class", e.to_string(), None),
        EngineError::UnknownLesson(ref lesson_id) => err(
            id,
            "not_found",
            e.to_string(),
            Some(json!({ "lessonId": lesson_id })),
        ),
        EngineError::UnknownPlan(ref plan_id) => err(
            id,
            "not_found",
            e.to_string(),
            Some(json!({ "planId": plan_id })),
        ),
        EngineError::InvalidEdit(_) => err(id, "bad_params", e.to_string(), None),
        EngineError::Storage(_) => err(id, "storage_failed", e.to_string(), None),
    }
}
