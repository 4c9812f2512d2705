#![no_main]

use libfuzzer_sys::fuzz_target;
use linex::query::{parse_query, TermTable};

fuzz_target!(|data: &str| {
    // Parsing never panics, and a rejected query leaves the table untouched
    let mut table = TermTable::new();
    let before = table.len();
    match parse_query(data, &mut table) {
        Ok(query) => assert!(query.terms().iter().all(|bit| table.term(bit).is_some())),
        Err(_) => assert_eq!(table.len(), before),
    }
});
