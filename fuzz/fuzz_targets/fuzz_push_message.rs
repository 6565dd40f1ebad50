#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Exercise the raw-byte deserialization path (includes serde_json's
    // own UTF-8 validation and error handling for invalid sequences).
    let _ = serde_json::from_slice::<bingo_client::protocol::PushMessage>(data);

    // Also exercise the str-based path for valid UTF-8 input, plus the
    // lenient accessors that pick the payload apart.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(message) = serde_json::from_str::<bingo_client::protocol::PushMessage>(s) {
            let _ = message.event_kind();
            let _ = message.item_id();
            let _ = message.item_theme();
        }
    }
});
