use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    /// Upper bound on the summed length (in chars) of one batch's items.
    pub max_chars: Option<usize>,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: 120,
            max_chars: None,
        }
    }
}

/// A contiguous run of units. `range` indexes into the document's unit list
/// and is the only thing used to put results back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub range: Range<usize>,
    pub items: Vec<String>,
}

pub fn plan_batches(texts: &[String], limits: BatchLimits) -> Vec<Batch> {
    let max_items = limits.max_items.max(1);
    let mut batches = Vec::new();
    let mut start = 0usize;
    let mut chars = 0usize;

    for (idx, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let count = idx - start;
        let over_items = count >= max_items;
        let over_chars = limits
            .max_chars
            .is_some_and(|max| count > 0 && chars + len > max);
        if over_items || over_chars {
            batches.push(make_batch(batches.len(), start..idx, texts));
            start = idx;
            chars = 0;
        }
        chars += len;
    }
    if start < texts.len() {
        batches.push(make_batch(batches.len(), start..texts.len(), texts));
    }
    batches
}

fn make_batch(index: usize, range: Range<usize>, texts: &[String]) -> Batch {
    Batch {
        index,
        items: texts[range.clone()].to_vec(),
        range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn ranges(batches: &[Batch]) -> Vec<Range<usize>> {
        batches.iter().map(|batch| batch.range.clone()).collect()
    }

    #[test]
    fn splits_by_item_count() {
        let input = texts(&["a", "b", "c", "d", "e"]);
        let batches = plan_batches(
            &input,
            BatchLimits {
                max_items: 2,
                max_chars: None,
            },
        );
        assert_eq!(ranges(&batches), vec![0..2, 2..4, 4..5]);
        assert_eq!(
            batches.iter().map(|batch| batch.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn concatenation_reconstructs_input() {
        let input = (0..121).map(|idx| format!("item {}", idx)).collect::<Vec<_>>();
        let batches = plan_batches(&input, BatchLimits::default());
        assert_eq!(ranges(&batches), vec![0..120, 120..121]);
        let joined = batches
            .into_iter()
            .flat_map(|batch| batch.items)
            .collect::<Vec<_>>();
        assert_eq!(joined, input);
    }

    #[test]
    fn char_budget_closes_batches_early() {
        let input = texts(&["aaaa", "bbbb", "cc", "dddddddddd", "e"]);
        let batches = plan_batches(
            &input,
            BatchLimits {
                max_items: 10,
                max_chars: Some(8),
            },
        );
        // the oversized item still gets a batch of its own
        assert_eq!(ranges(&batches), vec![0..2, 2..3, 3..4, 4..5]);
    }

    #[test]
    fn empty_input_and_zero_limit() {
        assert!(plan_batches(&[], BatchLimits::default()).is_empty());
        let batches = plan_batches(
            &texts(&["a", "b"]),
            BatchLimits {
                max_items: 0,
                max_chars: None,
            },
        );
        assert_eq!(ranges(&batches), vec![0..1, 1..2]);
    }
}
