//! Golden wire-format snapshots, pinning exact byte layout
//! rather than re-deriving it field by field — catches any drift in how
//! a codec lays bytes out even when the higher-level round trip still
//! happens to hold.

use std::sync::Arc;

use relaywire_codec::binary::{BinaryCodec, ByteOrder};
use relaywire_codec::Serializer;
use relaywire_types::{FieldSpec, Message, MessageSpec, ScalarKind, SchemaRegistry, SizeRefHook, SizeSource, TypeDescriptor};

/// `Buf = { buf_len: u32 (hook fwd x+4, inv
/// x-4), buf: Buffer(size_ref=buf_len), a: f32 }`, value `{buf="abcdefg",
/// a=3.1415926}`. `buf_len` must carry the *hooked* length (11, not 7).
#[test]
fn s2_binary_size_ref_hook_wire_snapshot() {
    let hook = SizeRefHook { forward: |n| n + 4, inverse: |n| n - 4 };
    let spec = Arc::new(MessageSpec::new(
        "Buf",
        vec![
            FieldSpec::new("buf_len", TypeDescriptor::Scalar(ScalarKind::Uint32)),
            FieldSpec::new("buf", TypeDescriptor::Buffer(SizeSource::SizeRef("buf_len".into()))).with_size_ref_hook(hook),
            FieldSpec::new("a", TypeDescriptor::Scalar(ScalarKind::Float)),
        ],
    ));
    let registry = SchemaRegistry::new();
    let mut message = Message::new(Arc::clone(&spec));
    message.assign("buf", b"abcdefg".to_vec()).expect("buf assigns");
    message.assign("a", 3.141_592_6_f32).expect("a assigns");

    let codec = BinaryCodec::new(ByteOrder::Big);
    let bytes = codec.encode(&registry, &message).expect("encodes");
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

    insta::assert_snapshot!(hex, @"0000000b6162636465666740490fda");
}
