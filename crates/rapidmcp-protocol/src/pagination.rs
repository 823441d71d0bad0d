//! Opaque cursor pagination for list operations
//!
//! A cursor is the base64 encoding of `{"o":N}` where `N` is the absolute
//! offset of the next page. Invalid cursors decode to offset 0 rather than
//! erroring, so clients holding stale cursors restart from the first page.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

/// Encode an offset into an opaque cursor
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(json!({ "o": offset }).to_string())
}

/// Decode a cursor back into an offset; anything invalid yields 0
pub fn decode_cursor(cursor: &str) -> usize {
    let Ok(bytes) = STANDARD.decode(cursor) else {
        return 0;
    };
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return 0;
    };
    value
        .get("o")
        .and_then(serde_json::Value::as_u64)
        .map(|o| o as usize)
        .unwrap_or(0)
}

/// One page of items plus the cursor for the next page, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Cursor for the next page; absent on the last page
    pub next_cursor: Option<String>,
}

/// Slice `items` by cursor offset with the given page size
///
/// `page_size <= 0` disables pagination: the whole list is returned as a
/// single page with no cursor.
pub fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: i64) -> Page<T> {
    if page_size <= 0 {
        return Page {
            items: items.to_vec(),
            next_cursor: None,
        };
    }
    let page_size = page_size as usize;

    let offset = cursor.filter(|c| !c.is_empty()).map_or(0, decode_cursor);
    if offset >= items.len() {
        return Page {
            items: Vec::new(),
            next_cursor: None,
        };
    }

    let end = (offset + page_size).min(items.len());
    let next_cursor = (end < items.len()).then(|| encode_cursor(end));
    Page {
        items: items[offset..end].to_vec(),
        next_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn cursor_round_trip() {
        for offset in [0usize, 1, 2, 5, 1000, usize::from(u16::MAX)] {
            assert_eq!(decode_cursor(&encode_cursor(offset)), offset);
        }
    }

    #[test]
    fn invalid_cursor_decodes_to_zero() {
        assert_eq!(decode_cursor("anything-invalid"), 0);
        assert_eq!(decode_cursor(""), 0);
        assert_eq!(decode_cursor("!!!not-base64!!!"), 0);
        // Valid base64, not JSON
        assert_eq!(decode_cursor(&STANDARD.encode("plain text")), 0);
        // Valid JSON, wrong shape
        assert_eq!(decode_cursor(&STANDARD.encode("{\"x\":1}")), 0);
    }

    #[test]
    fn three_pages_of_five_items() {
        let items = vec!["t1", "t2", "t3", "t4", "t5"];

        let page1 = paginate(&items, None, 2);
        assert_eq!(page1.items, vec!["t1", "t2"]);
        let c1 = page1.next_cursor.expect("page 1 has more");

        let page2 = paginate(&items, Some(&c1), 2);
        assert_eq!(page2.items, vec!["t3", "t4"]);
        let c2 = page2.next_cursor.expect("page 2 has more");

        let page3 = paginate(&items, Some(&c2), 2);
        assert_eq!(page3.items, vec!["t5"]);
        assert!(page3.next_cursor.is_none());
    }

    #[test]
    fn zero_page_size_disables_pagination() {
        let items: Vec<u32> = (0..10).collect();
        let page = paginate(&items, None, 0);
        assert_eq!(page.items.len(), 10);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn out_of_range_cursor_yields_empty_last_page() {
        let items = vec![1, 2, 3];
        let cursor = encode_cursor(10);
        let page = paginate(&items, Some(&cursor), 2);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    proptest! {
        // Invariant: concatenating pages reproduces the list in order with no
        // duplicates.
        #[test]
        fn pages_concatenate_to_original(len in 0usize..50, page_size in 1i64..10) {
            let items: Vec<usize> = (0..len).collect();
            let mut collected = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = paginate(&items, cursor.as_deref(), page_size);
                collected.extend(page.items);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            prop_assert_eq!(collected, items);
        }

        #[test]
        fn cursor_decode_encode_identity(offset in 0usize..1_000_000) {
            prop_assert_eq!(decode_cursor(&encode_cursor(offset)), offset);
        }
    }
}
