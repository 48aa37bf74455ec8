//! Fuzz target for status body parsing and outbound encoding
//!
//! # Invariants
//!
//! - `parse_status` never panics; only non-JSON input is an error
//! - A parsed roster has no duplicates and iterates sorted
//! - Encoded messages carry the trimmed body unchanged

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use murmur_core::{OutboundMessage, parse_status};

#[derive(Debug, Arbitrary)]
struct Input {
    body: String,
    target: String,
    text: String,
}

fuzz_target!(|input: Input| {
    if let Ok(report) = parse_status(&input.body) {
        let users: Vec<&str> = report.roster.iter().collect();
        assert!(users.windows(2).all(|pair| pair[0] < pair[1]), "roster not sorted: {users:?}");
        assert_eq!(users.len(), report.roster.len());
    }

    if let Ok(message) = OutboundMessage::direct(&input.target, &input.text) {
        let wire = message.encode();
        assert!(wire.starts_with('@'));
        assert!(wire.ends_with(input.text.trim()));
    }
    if let Ok(message) = OutboundMessage::broadcast(&input.text) {
        assert_eq!(message.encode(), input.text.trim());
    }
});
