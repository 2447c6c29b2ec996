use serde_json::Value;

use crate::post::parse_cid;

/// Delta-fetch narrowing: only records changed after `since`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFilter {
    pub since: u64,
}

/// Highest change id seen so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeCursor {
    latest: u64,
}

impl ChangeCursor {
    pub fn new() -> Self {
        ChangeCursor::default()
    }

    /// Records whose `CId` is missing or not a number are skipped, never
    /// counted as zero.
    pub fn observe<'a, I>(&mut self, records: I) -> u64
    where
        I: IntoIterator<Item = &'a Value>,
    {
        for record in records {
            if let Some(cid) = record.get("CId").and_then(parse_cid) {
                if cid > self.latest {
                    self.latest = cid;
                }
            }
        }
        self.latest
    }

    pub fn value(&self) -> u64 {
        self.latest
    }

    pub fn as_query_filter(&self) -> Option<QueryFilter> {
        if self.latest == 0 {
            None
        } else {
            Some(QueryFilter { since: self.latest })
        }
    }

    /// Only for a full reload.
    pub fn reset(&mut self) {
        self.latest = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_cursor_fetches_everything() {
        let cursor = ChangeCursor::new();
        assert_eq!(cursor.value(), 0);
        assert_eq!(cursor.as_query_filter(), None);
    }

    #[test]
    fn test_cursor_never_decreases() {
        let mut cursor = ChangeCursor::new();
        let batches = vec![
            vec![json!({"CId": "5"}), json!({"CId": 3})],
            vec![json!({"CId": "abc"}), json!({"Id": 4})],
            vec![json!({"CId": -20}), json!({"CId": null}), json!({"CId": 2})],
            vec![json!({"CId": 11.0}), json!({"CId": " 9 "})],
            vec![json!({"CId": "12.7"}), json!({"CId": "-30"}), json!({"CId": "NaN"})],
        ];

        let mut seen = Vec::new();
        for batch in &batches {
            seen.push(cursor.observe(batch));
        }

        assert_eq!(seen, vec![5, 5, 5, 11, 12]);
        assert_eq!(cursor.as_query_filter(), Some(QueryFilter { since: 12 }));
    }

    #[test]
    fn test_reset() {
        let mut cursor = ChangeCursor::new();
        cursor.observe(&[json!({"CId": 8})]);
        cursor.reset();
        assert_eq!(cursor.as_query_filter(), None);
    }
}
