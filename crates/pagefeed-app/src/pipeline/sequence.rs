//! Derives the next work-item sequence number from existing keys.

use std::sync::OnceLock;

use regex::Regex;

fn task_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^TASK_(\d+)\.json$").expect("task name pattern compiles"))
}

/// Extracts the sequence number from a work-item key.
///
/// Only the final path segment is inspected, and it must match
/// `TASK_<digits>.json` in full: backups such as `TASK_12.json.bak` never
/// advance the counter. Digits that overflow `u64` yield `None`.
pub fn parse_task_sequence(key: &str) -> Option<u64> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let captures = task_name_pattern().captures(file_name)?;
    captures.get(1)?.as_str().parse().ok()
}

/// `max(sequence) + 1` over every matching key, or `1` when nothing matches.
///
/// Gaps are tolerated: the result follows the largest number, not the count.
pub fn next_sequence<I, S>(keys: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter_map(|key| parse_task_sequence(key.as_ref()))
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::pipeline::keys::task_key;

    #[test]
    fn empty_namespace_starts_at_one() {
        assert_eq!(next_sequence(Vec::<String>::new()), 1);
    }

    #[test]
    fn non_matching_keys_are_ignored() {
        let keys = [
            "ingest/",
            "ingest/notes.txt",
            "ingest/TASK_.json",
            "ingest/TASK_12.json.bak",
            "ingest/task_0000009.json",
            "ingest/TASK_00x1.json",
        ];
        assert_eq!(next_sequence(keys), 1);
    }

    #[test]
    fn takes_max_plus_one_not_count() {
        let keys = [
            "ingest/TASK_0000001.json",
            "ingest/TASK_0000003.json",
            "ingest/TASK_0000002.json",
        ];
        assert_eq!(next_sequence(keys), 4);

        let sparse = ["ingest/TASK_0000001.json", "ingest/TASK_0000040.json"];
        assert_eq!(next_sequence(sparse), 41);
    }

    #[test]
    fn suffixed_names_do_not_count() {
        assert_eq!(parse_task_sequence("ingest/TASK_12.json.bak"), None);
        assert_eq!(parse_task_sequence("ingest/TASK_12.json~"), None);
        assert_eq!(
            next_sequence(["ingest/TASK_0000003.json", "ingest/TASK_0000090.json.bak"]),
            4
        );
    }

    #[test]
    fn nested_keys_use_file_name() {
        assert_eq!(parse_task_sequence("ingest/archive/TASK_0000007.json"), Some(7));
        assert_eq!(parse_task_sequence("TASK_0000007.json"), Some(7));
    }

    #[test]
    fn overflowing_digits_are_ignored() {
        let keys = ["ingest/TASK_99999999999999999999999.json", "ingest/TASK_0000002.json"];
        assert_eq!(next_sequence(keys), 3);
    }

    proptest! {
        #[test]
        fn next_is_strictly_greater_than_every_emitted_key(
            seqs in proptest::collection::vec(1u64..10_000_000, 0..64)
        ) {
            let keys: Vec<String> = seqs.iter().map(|seq| task_key(*seq)).collect();
            let next = next_sequence(&keys);
            prop_assert!(seqs.iter().all(|seq| *seq < next));
            prop_assert_eq!(next, seqs.iter().max().map_or(1, |max| max + 1));
        }
    }
}
