mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn tag_catalog_defaults_edits_and_persists() {
    let workspace = temp_dir("lessond-curriculum");
    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        select_workspace(&mut stdin, &mut reader, &workspace);

        let loaded = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "curriculum.load",
            json!({ "classId": "Reception" }),
        );
        let catalog = &loaded["catalog"];
        assert_eq!(catalog["origin"], "bootstrap");
        let tags = catalog["tags"].as_array().expect("tags");
        assert!(tags.iter().any(|t| t == "Music: Pitch and singing"));
        let music = catalog["structured"]
            .as_array()
            .and_then(|a| a.iter().find(|area| area["area"] == "Music"))
            .expect("music area");
        assert_eq!(music["details"].as_array().map(|d| d.len()), Some(4));

        let added = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "curriculum.add",
            json!({ "classId": "Reception", "tag": "Music: Timbre" }),
        );
        assert!(added["catalog"]["tags"]
            .as_array()
            .expect("tags")
            .iter()
            .any(|t| t == "Music: Timbre"));
        let sync = added["sync"].as_array().expect("sync reports");
        assert_eq!(sync.len(), 2);
        assert!(sync.iter().all(|r| r["synced"] == false));

        let removed = request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "curriculum.remove",
            json!({ "classId": "Reception", "tag": "Music: Pitch and singing" }),
        );
        assert!(!removed["catalog"]["tags"]
            .as_array()
            .expect("tags")
            .iter()
            .any(|t| t == "Music: Pitch and singing"));

        let missing = request_err(
            &mut stdin,
            &mut reader,
            "4",
            "curriculum.add",
            json!({ "classId": "Reception" }),
        );
        assert_eq!(missing["code"], "bad_params");
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let reloaded = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "curriculum.load",
        json!({ "classId": "Reception" }),
    );
    assert_eq!(reloaded["catalog"]["origin"], "local");
    let tags = reloaded["catalog"]["tags"].as_array().expect("tags");
    assert!(tags.iter().any(|t| t == "Music: Timbre"));
    assert!(!tags.iter().any(|t| t == "Music: Pitch and singing"));

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "curriculum.load",
        json!({ "classId": "UKG" }),
    );
    assert_eq!(other["catalog"]["origin"], "bootstrap");
}
