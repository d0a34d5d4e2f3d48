use crate::engine::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    optional_str, required_date, required_index, required_str, required_text, session, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Activity, PlanStatus};
use crate::plan::{LessonPlan, PlanEdit};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

fn plan_result(req: &Request, result: Result<LessonPlan, EngineError>) -> serde_json::Value {
    match result {
        Ok(plan) => match to_json(req, &plan) {
            Ok(v) => ok(&req.id, json!({ "plan": v })),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

/// Fills the bookkeeping fields a client may leave out of a new plan.
fn plan_from_params(req: &Request) -> Result<LessonPlan, serde_json::Value> {
    let Some(mut raw) = req.params.get("plan").cloned().filter(|v| v.is_object()) else {
        return Err(err(&req.id, "bad_params", "missing plan object", None));
    };
    let now = Utc::now().to_rfc3339();
    if let Some(obj) = raw.as_object_mut() {
        let blank_id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if blank_id {
            obj.insert("id".into(), json!(Uuid::new_v4().to_string()));
        }
        obj.entry("week").or_insert(json!(0));
        obj.entry("className").or_insert(json!(""));
        obj.entry("createdAt").or_insert(json!(now));
        obj.entry("updatedAt").or_insert(json!(now));
    }
    serde_json::from_value(raw).map_err(|e| {
        err(
            &req.id,
            "bad_params",
            format!("invalid plan: {e}"),
            None,
        )
    })
}

fn handle_list(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let class_id = optional_str(req, "classId");
    match session.engine.list_plans(class_id.as_deref()) {
        Ok(plans) => match to_json(req, &plans) {
            Ok(v) => ok(&req.id, json!({ "plans": v })),
            Err(e) => e,
        },
        Err(e) => engine_err(&req.id, e),
    }
}

fn handle_get(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    plan_result(req, session.engine.get_plan(&plan_id))
}

async fn handle_save(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let plan = match plan_from_params(req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    plan_result(req, session.engine.save_plan(plan).await)
}

async fn handle_delete(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match session.engine.delete_plan(&plan_id).await {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => engine_err(&req.id, e),
    }
}

async fn handle_create_from_lesson(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let date = match required_date(req, "date") {
        Ok(v) => v,
        Err(e) => return e,
    };
    plan_result(
        req,
        session.engine.create_plan_from_lesson(&lesson_id, date).await,
    )
}

fn edit_from_params(req: &Request) -> Result<PlanEdit, serde_json::Value> {
    match req.method.as_str() {
        "plans.addActivity" => {
            let Some(raw) = req.params.get("activity").cloned() else {
                return Err(err(&req.id, "bad_params", "missing activity", None));
            };
            let activity: Activity = serde_json::from_value(raw).map_err(|e| {
                err(&req.id, "bad_params", format!("invalid activity: {e}"), None)
            })?;
            if activity.activity_name.trim().is_empty() || activity.category.trim().is_empty() {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "activity needs activityName and category",
                    None,
                ));
            }
            Ok(PlanEdit::AddActivity(activity))
        }
        "plans.removeActivity" => Ok(PlanEdit::RemoveActivity(required_index(req, "index")?)),
        "plans.moveActivity" => Ok(PlanEdit::MoveActivity {
            from: required_index(req, "from")?,
            to: required_index(req, "to")?,
        }),
        "plans.setNotes" => Ok(PlanEdit::SetNotes(required_text(req, "notes")?)),
        "plans.setDate" => Ok(PlanEdit::SetDate(required_date(req, "date")?)),
        "plans.setStatus" => {
            let raw = required_str(req, "status")?;
            PlanStatus::parse(&raw).map(PlanEdit::SetStatus).ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    "status must be draft, planned, completed or cancelled",
                    Some(json!({ "value": raw })),
                )
            })
        }
        _ => Err(err(&req.id, "not_implemented", "unknown plan edit", None)),
    }
}

async fn handle_edit(state: &AppState, req: &Request) -> serde_json::Value {
    let session = match session(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let plan_id = match required_str(req, "planId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let edit = match edit_from_params(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    plan_result(req, session.engine.edit_plan(&plan_id, edit).await)
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plans.list" => Some(handle_list(state, req)),
        "plans.get" => Some(handle_get(state, req)),
        "plans.save" => Some(handle_save(state, req).await),
        "plans.delete" => Some(handle_delete(state, req).await),
        "plans.createFromLesson" => Some(handle_create_from_lesson(state, req).await),
        "plans.addActivity"
        | "plans.removeActivity"
        | "plans.moveActivity"
        | "plans.setNotes"
        | "plans.setStatus"
        | "plans.setDate" => Some(handle_edit(state, req).await),
        _ => None,
    }
}
