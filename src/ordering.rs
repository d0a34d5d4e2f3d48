//! Category ordering and lesson title heuristics shared by the parser and
//! the plan converter.

const CATEGORY_PRIORITY: &[&str] = &[
    "Welcome",
    "Kodaly Songs",
    "Kodaly Action Songs",
    "Action/Games Songs",
    "Rhythm Sticks",
    "Scarf Songs",
    "General Game",
    "Core Songs",
    "Parachute Games",
    "Percussion Games",
    "Teaching Units",
    "Kodaly Rhythms",
    "Kodaly Games",
    "IWB Games",
    "Goodbye",
];

// Checked in this order when a lesson has no welcome/goodbye frame.
const TITLE_CATEGORIES: &[&str] = &[
    "Kodaly Songs",
    "Core Songs",
    "Action/Games Songs",
    "Rhythm Sticks",
    "Scarf Songs",
    "Parachute Games",
    "Percussion Games",
    "Kodaly Rhythms",
];

fn priority_of(name: &str) -> Option<usize> {
    CATEGORY_PRIORITY.iter().position(|p| *p == name)
}

/// Orders category names: known names by their priority index, then every
/// unknown name sorted lexicographically. Duplicates collapse.
pub fn order_categories<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut known: Vec<(usize, &str)> = Vec::new();
    let mut unknown: Vec<&str> = Vec::new();
    for name in names {
        match priority_of(name) {
            Some(idx) => {
                if !known.iter().any(|(_, n)| *n == name) {
                    known.push((idx, name));
                }
            }
            None => {
                if !unknown.contains(&name) {
                    unknown.push(name);
                }
            }
        }
    }
    known.sort_by_key(|(idx, _)| *idx);
    unknown.sort_unstable();
    known
        .into_iter()
        .map(|(_, n)| n)
        .chain(unknown)
        .map(str::to_string)
        .collect()
}

fn is_welcome(name: &str) -> bool {
    name.to_ascii_lowercase().contains("welcome")
}

fn is_goodbye(name: &str) -> bool {
    name.to_ascii_lowercase().contains("goodbye")
}

/// Advisory display title derived from a lesson's category ordering.
pub fn synthesize_title(category_order: &[String]) -> String {
    let has_welcome = category_order.iter().any(|c| is_welcome(c));
    let has_goodbye = category_order.iter().any(|c| is_goodbye(c));

    if has_welcome && has_goodbye {
        return match category_order
            .iter()
            .find(|c| !is_welcome(c) && !is_goodbye(c))
        {
            Some(main) => format!("{main} Lesson"),
            None => "Standard Lesson".to_string(),
        };
    }

    if let Some(hit) = TITLE_CATEGORIES
        .iter()
        .find(|t| category_order.iter().any(|c| c.as_str() == **t))
    {
        return format!("{hit} Lesson");
    }

    match category_order.first() {
        Some(first) => format!("{first} Lesson"),
        None => "Untitled Lesson".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_categories_follow_priority_then_unknown_alphabetical() {
        let got = order_categories(["Zebra Dance", "Goodbye", "Core Songs", "Apple Game", "Welcome"]);
        assert_eq!(
            got,
            strings(&["Welcome", "Core Songs", "Goodbye", "Apple Game", "Zebra Dance"])
        );
    }

    #[test]
    fn ordering_is_deterministic_and_collapses_duplicates() {
        let input = ["Scarf Songs", "Welcome", "Scarf Songs", "Misc"];
        let a = order_categories(input);
        let b = order_categories(input);
        assert_eq!(a, b);
        assert_eq!(a, strings(&["Welcome", "Scarf Songs", "Misc"]));
    }

    #[test]
    fn welcome_and_goodbye_frame_takes_middle_category() {
        let order = strings(&["Welcome", "Rhythm Sticks", "Core Songs", "Goodbye"]);
        assert_eq!(synthesize_title(&order), "Rhythm Sticks Lesson");
        assert_eq!(
            synthesize_title(&strings(&["Welcome", "Goodbye"])),
            "Standard Lesson"
        );
    }

    #[test]
    fn recognised_category_then_first_then_untitled() {
        assert_eq!(
            synthesize_title(&strings(&["Welcome", "Scarf Songs", "Core Songs"])),
            "Core Songs Lesson"
        );
        assert_eq!(
            synthesize_title(&strings(&["Teaching Units", "IWB Games"])),
            "Teaching Units Lesson"
        );
        assert_eq!(synthesize_title(&[]), "Untitled Lesson");
    }

    #[test]
    fn frame_detection_ignores_case() {
        let order = strings(&["welcome songs", "Goodbye Song"]);
        assert_eq!(synthesize_title(&order), "Standard Lesson");
    }
}
