#![no_main]
use libfuzzer_sys::fuzz_target;
use mcm_core::codec::decode_position;

fuzz_target!(|input: (u8, &[u8])| {
    let (channel, frame) = input;
    if let Ok(counts) = decode_position(channel, frame) {
        // Only a full frame that echoes the channel decodes.
        assert!(frame.len() >= 12);
        assert_eq!(frame[6], channel);
        assert_eq!(&counts.to_le_bytes()[..], &frame[8..12]);
    }
});
