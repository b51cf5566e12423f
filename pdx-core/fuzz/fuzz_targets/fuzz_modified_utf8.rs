#![no_main]

use libfuzzer_sys::fuzz_target;

use pdx_core::serialization::modified_utf8;

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = modified_utf8::decode(data) {
        let encoded = modified_utf8::encode(&decoded);
        assert_eq!(modified_utf8::decode(&encoded).ok().as_deref(), Some(decoded.as_str()));
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let encoded = modified_utf8::encode(text);
        assert_eq!(encoded.len(), modified_utf8::encoded_len(text));
        assert_eq!(modified_utf8::decode(&encoded).ok().as_deref(), Some(text));
    }
});
