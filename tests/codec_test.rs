/*!
 * Wire Codec Tests
 */

use proptest::prelude::*;
use weft_capture::event::codec;
use weft_capture::{Payload, ProducerId, RawEvent};

fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop_oneof![
        (".{0,64}", ".{0,64}", any::<bool>()).prop_map(|(f, a, t)| Payload::CallEntry {
            function: f.into(),
            args_preview: a.into(),
            truncated: t,
        }),
        (".{0,64}", ".{0,64}", any::<bool>()).prop_map(|(f, r, t)| Payload::CallExit {
            function: f.into(),
            return_preview: r.into(),
            truncated: t,
        }),
        (any::<u64>(), any::<u64>(), any::<usize>()).prop_map(|(r, fp, b)| Payload::MessageSend {
            recipient: ProducerId(r),
            fingerprint: fp,
            bytes: b,
        }),
        (any::<u64>(), any::<u64>(), any::<usize>()).prop_map(|(s, fp, b)| {
            Payload::MessageReceive {
                sender: ProducerId(s),
                fingerprint: fp,
                bytes: b,
            }
        }),
        (".{0,32}", ".{0,32}", ".{0,32}").prop_map(|(s, f, t)| Payload::StateChange {
            subject: s.into(),
            from: f.into(),
            to: t.into(),
            truncated: false,
        }),
        (any::<u64>(), ".{0,32}").prop_map(|(c, n)| Payload::ProcessSpawn {
            child: ProducerId(c),
            name: n.into(),
        }),
        any::<Option<i32>>().prop_map(|code| Payload::ProcessExit { exit_code: code }),
        (".{0,64}", any::<bool>()).prop_map(|(m, t)| Payload::Error {
            message: m.into(),
            truncated: t,
        }),
    ]
}

proptest! {
    /// Encoding then decoding yields a value equal in all fields
    #[test]
    fn prop_roundtrip_equality(
        producer in any::<u64>(),
        sequence in any::<u64>(),
        payload in payload_strategy(),
    ) {
        let mut event = RawEvent::new(ProducerId(producer), payload);
        event.sequence = sequence;

        let frame = codec::encode(&event).unwrap();
        let decoded = codec::decode(&frame).unwrap();
        prop_assert_eq!(decoded, event);
    }

    /// Corrupting the version byte is always rejected, never misparsed
    #[test]
    fn prop_bad_version_rejected(version in 2u8..) {
        let event = RawEvent::new(ProducerId(1), Payload::ProcessExit { exit_code: None });
        let mut frame = codec::encode(&event).unwrap();
        frame[0] = version;
        prop_assert!(codec::decode(&frame).is_err());
    }
}
