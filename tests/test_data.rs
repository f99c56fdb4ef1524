#![allow(dead_code)]

use serde_json::{json, Value};

/// A record as a hosted document store returns it, including a field this crate does not model.
pub fn stored_record(id: &str, title: &str, category: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": "Nairobi woke up to heavy rain.\n\nCommuters were stranded for hours.",
        "category": category,
        "author": "Achieng",
        "image": "",
        "readTime": "3 min",
        "createdAt": created_at,
        "views": 12,
        "likes": 4,
        "editorNote": "verified"
    })
}

pub fn seeded_records() -> Vec<Value> {
    vec![
        stored_record("a-3", "Gor Mahia clinch the league", "sports", "2024-03-03T09:00:00Z"),
        stored_record("a-2", "Shilling gains against the dollar", "business", "2024-03-02T09:00:00Z"),
        stored_record("a-1", "Finance bill tabled", "politics", "2024-03-01T09:00:00Z"),
    ]
}

/// Smallest valid PNG header; enough for MIME sniffing.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
