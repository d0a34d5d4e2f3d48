mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, sample_rows, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn plans_shadow_base_lessons_until_deleted() {
    let workspace = temp_dir("lessond-plans");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.load",
        json!({ "classId": "Nursery" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lessons.import",
        json!({ "rows": sample_rows() }),
    );

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "plans.save",
        json!({
            "plan": {
                "date": "2026-03-02",
                "lessonNumber": "10",
                "activities": [
                    { "activityName": "Scarf Twirl", "category": "Scarf Songs", "time": 5 },
                    { "activityName": "Hello", "category": "Welcome", "time": 3 }
                ],
                "duration": 999,
                "notes": "Bring scarves"
            }
        }),
    );
    let plan = &saved["plan"];
    let plan_id = plan["id"].as_str().expect("plan id").to_string();
    assert_eq!(plan["className"], "Nursery");
    assert_eq!(plan["duration"], 8);
    assert_eq!(plan["week"], 10);
    assert_eq!(plan["status"], "draft");

    let snapshot = request_ok(&mut stdin, &mut reader, "4", "lessons.snapshot", json!({}));
    let ten = &snapshot["view"]["lessons"]["10"];
    assert_eq!(ten["source"]["kind"], "plan");
    assert_eq!(ten["source"]["planId"], plan_id.as_str());
    assert_eq!(ten["data"]["categoryOrder"], json!(["Welcome", "Scarf Songs"]));
    assert_eq!(ten["data"]["totalTime"], 8);
    assert_eq!(snapshot["view"]["lessonIds"], json!(["1", "2", "10"]));

    let titled = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.setTitle",
        json!({ "lessonId": "10", "title": "Scarves" }),
    );
    assert_eq!(titled["lesson"]["title"], "Scarves");
    let stored = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "plans.get",
        json!({ "planId": plan_id }),
    );
    assert_eq!(stored["plan"]["title"], "Scarves");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "plans.list",
        json!({ "classId": "Nursery" }),
    );
    assert_eq!(listed["plans"].as_array().map(|p| p.len()), Some(1));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "plans.delete",
        json!({ "planId": plan_id }),
    );
    assert_eq!(deleted["deleted"], true);
    let snapshot = request_ok(&mut stdin, &mut reader, "9", "lessons.snapshot", json!({}));
    assert_eq!(snapshot["view"]["lessons"]["10"]["source"]["kind"], "base");

    let again = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "plans.delete",
        json!({ "planId": plan_id }),
    );
    assert_eq!(again["deleted"], false);
    let gone = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "plans.get",
        json!({ "planId": plan_id }),
    );
    assert_eq!(gone["code"], "not_found");
}

#[test]
fn plan_editing_keeps_duration_in_step() {
    let workspace = temp_dir("lessond-plan-edit");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lessons.load",
        json!({ "classId": "LKG" }),
    );

    let seeded = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "plans.createFromLesson",
        json!({ "lessonId": "1", "date": "2026-04-13" }),
    );
    let plan_id = seeded["plan"]["id"].as_str().expect("plan id").to_string();
    assert_eq!(seeded["plan"]["lessonNumber"], "1");
    assert_eq!(seeded["plan"]["duration"], 15);
    assert_eq!(seeded["plan"]["week"], 16);
    let first_instance = seeded["plan"]["activities"][0]["instanceId"].clone();
    assert!(first_instance.is_string());

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "plans.addActivity",
        json!({
            "planId": plan_id,
            "activity": { "activityName": "Mushroom", "category": "Parachute Games", "time": 6 }
        }),
    );
    assert_eq!(added["plan"]["duration"], 21);
    assert_eq!(added["plan"]["activities"].as_array().map(|a| a.len()), Some(5));

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "plans.moveActivity",
        json!({ "planId": plan_id, "from": 4, "to": 0 }),
    );
    assert_eq!(moved["plan"]["activities"][0]["activityName"], "Mushroom");
    assert_eq!(moved["plan"]["duration"], 21);

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "plans.removeActivity",
        json!({ "planId": plan_id, "index": 0 }),
    );
    assert_eq!(removed["plan"]["duration"], 15);

    let out_of_range = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "plans.removeActivity",
        json!({ "planId": plan_id, "index": 40 }),
    );
    assert_eq!(out_of_range["code"], "bad_params");

    let status = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "plans.setStatus",
        json!({ "planId": plan_id, "status": "Completed" }),
    );
    assert_eq!(status["plan"]["status"], "completed");
    let bad_status = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "plans.setStatus",
        json!({ "planId": plan_id, "status": "someday" }),
    );
    assert_eq!(bad_status["code"], "bad_params");

    let notes = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "plans.setNotes",
        json!({ "planId": plan_id, "notes": "Went well" }),
    );
    assert_eq!(notes["plan"]["notes"], "Went well");

    let moved_date = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "plans.setDate",
        json!({ "planId": plan_id, "date": "2026-01-05" }),
    );
    assert_eq!(moved_date["plan"]["week"], 2);
    assert_eq!(
        moved_date["plan"]["createdAt"], seeded["plan"]["createdAt"],
        "createdAt is kept across edits"
    );

    let snapshot = request_ok(&mut stdin, &mut reader, "11", "lessons.snapshot", json!({}));
    let one = &snapshot["view"]["lessons"]["1"];
    assert_eq!(one["source"]["kind"], "plan");
    assert_eq!(one["data"]["totalTime"], 15);

    let unknown = request_err(
        &mut stdin,
        &mut reader,
        "12",
        "plans.setNotes",
        json!({ "planId": "nope", "notes": "" }),
    );
    assert_eq!(unknown["code"], "not_found");
}
