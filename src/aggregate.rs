use crate::batch::Batch;
use crate::types::{PageOutcome, UnifiedRecord};

/// Merge all successful pages into one record.
///
/// Pages are scanned in batch order. A field takes the first value seen and is
/// only replaced while it is still blank, so the first non-blank value wins.
/// The confidence always belongs to the value that currently holds the field.
pub fn unify(batch: &Batch) -> UnifiedRecord {
    let mut unified = UnifiedRecord::default();

    for result in batch.results() {
        let PageOutcome::Success {
            fields, confidence, ..
        } = &result.outcome
        else {
            continue;
        };
        for (field_id, value) in fields {
            let open = unified
                .fields
                .get(field_id)
                .map_or(true, |current| current.trim().is_empty());
            if !open {
                continue;
            }
            unified.fields.insert(field_id.clone(), value.clone());
            match confidence.get(field_id) {
                Some(score) => {
                    unified.confidence.insert(field_id.clone(), *score);
                }
                None => {
                    unified.confidence.remove(field_id);
                }
            }
        }
    }

    unified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceMap, FieldMap, PageResult};

    fn ok_page(i: usize, fields: &[(&str, &str)], confidence: &[(&str, f64)]) -> PageResult {
        PageResult {
            key: format!("image_{}", i + 1),
            source_name: format!("{}.png", i),
            source_index: i,
            outcome: PageOutcome::Success {
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<FieldMap>(),
                confidence: confidence
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<ConfidenceMap>(),
                overlay_image: None,
                detections: vec![],
            },
        }
    }

    fn failed_page(i: usize) -> PageResult {
        PageResult {
            key: format!("image_{}", i + 1),
            source_name: format!("{}.png", i),
            source_index: i,
            outcome: PageOutcome::Failed {
                error_message: "timeout".into(),
            },
        }
    }

    fn batch(pages: Vec<PageResult>) -> Batch {
        let mut batch = Batch::new();
        for p in pages {
            batch.push(p);
        }
        batch
    }

    #[test]
    fn first_non_empty_value_wins() {
        let b = batch(vec![
            ok_page(0, &[("A", "")], &[]),
            ok_page(1, &[("A", "x")], &[]),
            ok_page(2, &[("A", "y")], &[]),
        ]);
        assert_eq!(unify(&b).fields["A"], "x");
    }

    #[test]
    fn whitespace_only_value_is_replaced() {
        let b = batch(vec![
            ok_page(0, &[("Name", "   ")], &[("Name", 0.2)]),
            ok_page(1, &[("Name", "Alice")], &[("Name", 0.9)]),
        ]);
        let unified = unify(&b);
        assert_eq!(unified.fields["Name"], "Alice");
        assert_eq!(unified.confidence["Name"], 0.9);
    }

    #[test]
    fn confidence_follows_winning_value() {
        let b = batch(vec![
            ok_page(0, &[("Name", "")], &[("Name", 0.4)]),
            ok_page(1, &[("Name", "Bob")], &[]),
        ]);
        let unified = unify(&b);
        assert_eq!(unified.fields["Name"], "Bob");
        assert!(!unified.confidence.contains_key("Name"));
    }

    #[test]
    fn empty_value_is_kept_when_nothing_better_exists() {
        let b = batch(vec![ok_page(0, &[("Email", "")], &[])]);
        let unified = unify(&b);
        assert_eq!(unified.fields.get("Email").map(String::as_str), Some(""));
    }

    #[test]
    fn failed_pages_are_skipped() {
        let b = batch(vec![failed_page(0), ok_page(1, &[("Age", "31")], &[])]);
        let unified = unify(&b);
        assert_eq!(unified.fields.len(), 1);
        assert_eq!(unified.value("Age"), "31");
    }

    #[test]
    fn all_failed_batch_yields_empty_record() {
        let b = batch(vec![failed_page(0), failed_page(1)]);
        assert_eq!(unify(&b), UnifiedRecord::default());
    }

    #[test]
    fn unify_is_idempotent() {
        let b = batch(vec![
            ok_page(0, &[("A", "1"), ("B", "")], &[("A", 0.5)]),
            ok_page(1, &[("B", "2"), ("C", "3")], &[("C", 0.7)]),
        ]);
        assert_eq!(unify(&b), unify(&b));
    }
}
