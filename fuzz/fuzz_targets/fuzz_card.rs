#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cards carry nested grids with no shape guarantee from the server;
    // the accessors must stay in bounds for any deserialized value.
    if let Ok(card) = serde_json::from_slice::<bingo_client::protocol::Card>(data) {
        for row in 0..8 {
            for col in 0..8 {
                let _ = card.cell(row, col);
                let _ = card.is_marked(row, col);
            }
        }
    }
});
