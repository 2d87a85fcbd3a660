//! Page index parsing and slicing on arbitrary bytes.

#![no_main]

use foldtree::storage::read_page_index;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(entries) = read_page_index(data) {
        for entry in entries {
            let _ = entry.slice(data);
        }
    }
});
