//! Decoding arbitrary page and vector bytes must fail cleanly, never panic.

#![no_main]

use foldtree::graph::codec::deserialize_tree;
use foldtree::ExternalModel;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let split = data[0] as usize % data.len();
    let (page, vectors) = data[1..].split_at(split.min(data.len() - 1));

    let model = ExternalModel::new(64, 0.99, 0.5);
    if let Ok(tree) = deserialize_tree(page, vectors, &model) {
        assert!(tree.check_weights().unwrap_or(false));
    }
});
