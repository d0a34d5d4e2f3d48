use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::model::ParsedDataset;
use crate::parser;

const HEADER: [&str; 11] = [
    "Lesson Number",
    "Category",
    "Activity Name",
    "Description",
    "Level",
    "Time (Mins)",
    "Video",
    "Music",
    "Backing",
    "Resource",
    "Unit Name",
];

type SampleRow = [&'static str; 11];

const LKG_ROWS: &[SampleRow] = &[
    ["1", "Welcome", "Hello Song", "Sing hello to each child by name", "LKG", "3", "", "", "", "", "Autumn 1"],
    ["", "Kodaly Songs", "Bounce High", "Steady beat with a bouncing ball", "LKG", "5", "", "", "", "", "Autumn 1"],
    ["", "Scarf Songs", "Falling Leaves", "Float scarves high and low", "LKG", "5", "", "", "", "", "Autumn 1"],
    ["", "Goodbye", "Goodbye Song", "Wave goodbye and tidy up", "LKG", "2", "", "", "", "", "Autumn 1"],
    ["2", "Welcome", "Hello Song", "Sing hello to each child by name", "LKG", "3", "", "", "", "", "Autumn 1"],
    ["", "Rhythm Sticks", "Tap and Stop", "Tap sticks, freeze when the music stops", "LKG", "6", "", "", "", "", "Autumn 1"],
    ["", "Parachute Games", "Mushroom", "Lift the parachute on the beat", "LKG", "6", "", "", "", "", "Autumn 1"],
    ["", "Goodbye", "Goodbye Song", "Wave goodbye and tidy up", "LKG", "2", "", "", "", "", "Autumn 1"],
];

const UKG_ROWS: &[SampleRow] = &[
    ["1", "Welcome", "Good Morning", "Echo greeting in sol-mi", "UKG", "3", "", "", "", "", "Autumn 1"],
    ["", "Kodaly Action Songs", "Cobbler Cobbler", "Pass the shoe on the beat", "UKG", "6", "", "", "", "", "Autumn 1"],
    ["", "Percussion Games", "Loud and Quiet", "Play shakers at two dynamics", "UKG", "5", "", "", "", "", "Autumn 1"],
    ["", "Goodbye", "See You Soon", "Closing song", "UKG", "2", "", "", "", "", "Autumn 1"],
    ["2", "Welcome", "Good Morning", "Echo greeting in sol-mi", "UKG", "3", "", "", "", "", "Autumn 1"],
    ["", "Core Songs", "Engine Engine", "Speed up and slow down", "UKG", "5", "", "", "", "", "Autumn 1"],
    ["", "Kodaly Rhythms", "Ta and Ti-ti", "Read simple rhythm cards", "UKG", "6", "", "", "", "", "Autumn 1"],
    ["", "Goodbye", "See You Soon", "Closing song", "UKG", "2", "", "", "", "", "Autumn 1"],
];

const RECEPTION_ROWS: &[SampleRow] = &[
    ["1", "Welcome", "Hello Everybody", "Group greeting with actions", "Reception", "3", "", "", "", "", "Autumn 1"],
    ["", "Action/Games Songs", "Doggie Doggie", "Guess who has the bone", "Reception", "7", "", "", "", "", "Autumn 1"],
    ["", "Kodaly Games", "Lucy Locket", "Hide the pocket, sing louder when close", "Reception", "7", "", "", "", "", "Autumn 1"],
    ["", "Goodbye", "Goodbye Friends", "Closing song", "Reception", "2", "", "", "", "", "Autumn 1"],
];

fn builtin_rows(class_id: &str) -> Option<&'static [SampleRow]> {
    match class_id.trim().to_ascii_lowercase().as_str() {
        "lkg" => Some(LKG_ROWS),
        "ukg" => Some(UKG_ROWS),
        "reception" => Some(RECEPTION_ROWS),
        _ => None,
    }
}

fn to_rows(rows: &[SampleRow]) -> Vec<Vec<String>> {
    std::iter::once(&HEADER)
        .chain(rows.iter())
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Class ids name a file directly inside the bootstrap directory.
fn is_file_stem(class_id: &str) -> bool {
    let mut components = Path::new(class_id).components();
    !class_id.contains(['/', '\\'])
        && matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
}

fn file_rows(dir: &Path, class_id: &str) -> Option<Vec<Vec<String>>> {
    if !is_file_stem(class_id) {
        warn!(class_id, "class id is not a plain name; ignoring bootstrap directory");
        return None;
    }
    let path: PathBuf = dir.join(format!("{class_id}.json"));
    if !path.is_file() {
        return None;
    }
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "bootstrap file unreadable");
            return None;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "bootstrap file is not JSON");
            return None;
        }
    };
    match parser::rows_from_json(&value) {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "bootstrap file is not tabular");
            None
        }
    }
}

/// Sample dataset for a class: a `<class>.json` file in `dir` when present,
/// otherwise the built-in rows for the known age groups.
pub fn bootstrap_dataset(class_id: &str, dir: Option<&Path>) -> Option<ParsedDataset> {
    let rows = dir
        .and_then(|d| file_rows(d, class_id))
        .or_else(|| builtin_rows(class_id).map(to_rows))?;
    match parser::parse_rows(&rows) {
        Ok(dataset) => {
            debug!(class_id, lessons = dataset.lesson_ids.len(), "using bootstrap dataset");
            Some(dataset)
        }
        Err(e) => {
            warn!(class_id, error = %e, "bootstrap rows did not parse");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_parse_deterministically() {
        for class in ["LKG", "UKG", "Reception"] {
            let a = bootstrap_dataset(class, None).expect("dataset");
            let b = bootstrap_dataset(class, None).expect("dataset");
            assert_eq!(a, b);
            assert!(!a.lesson_ids.is_empty());
        }
        let lkg = bootstrap_dataset("lkg", None).expect("dataset");
        assert_eq!(lkg.lesson_ids, vec!["1", "2"]);
        assert_eq!(lkg.lesson_data["1"].total_time, 15);
        assert_eq!(lkg.lesson_data["1"].title.as_deref(), Some("Kodaly Songs Lesson"));
    }

    #[test]
    fn unknown_class_has_no_bootstrap() {
        assert!(bootstrap_dataset("Year 6", None).is_none());
    }

    #[test]
    fn directory_file_overrides_builtin_rows() {
        let dir = std::env::temp_dir().join(format!("lessond-bootstrap-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            dir.join("LKG.json"),
            r#"[["h"],["7","Core Songs","Engine","","LKG","4"]]"#,
        )
        .expect("write");

        let d = bootstrap_dataset("LKG", Some(&dir)).expect("dataset");
        assert_eq!(d.lesson_ids, vec!["7"]);
        let builtin = bootstrap_dataset("UKG", Some(&dir)).expect("dataset");
        assert_eq!(builtin.lesson_ids, vec!["1", "2"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn class_ids_cannot_leave_the_bootstrap_directory() {
        let root = std::env::temp_dir().join(format!("lessond-bootstrap-{}", uuid::Uuid::new_v4()));
        let dir = root.join("samples");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(
            root.join("outside.json"),
            r#"[["h"],["9","Core Songs","Engine","","LKG","4"]]"#,
        )
        .expect("write");

        assert!(bootstrap_dataset("../outside", Some(&dir)).is_none());
        assert!(bootstrap_dataset("..\\outside", Some(&dir)).is_none());
        assert!(bootstrap_dataset("..", Some(&dir)).is_none());
        assert!(!is_file_stem(""));
        assert!(!is_file_stem("."));
        assert!(!is_file_stem("/etc/passwd"));
        assert!(is_file_stem("LKG"));
        assert!(is_file_stem("Year 1 (Blue)"));
        let _ = std::fs::remove_dir_all(&root);
    }
}
