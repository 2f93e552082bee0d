use std::collections::BTreeMap;

use crate::*;

// ============================================================================
//  PACK
// ============================================================================

#[test]
fn test_scalar_roundtrip() -> Result<()> {
    let mut enc = Encoder::new();
    enc.bool(true)?;
    enc.bool(false)?;
    enc.u64(u64::MAX)?;
    enc.s64(i64::MIN)?;
    enc.f64(-2.5)?;
    enc.unit()?;
    enc.str("héllo")?;
    enc.bytes(&[0, 1, 2, 255])?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);

    assert!(dec.bool()?);
    assert!(!dec.bool()?);
    assert_eq!(dec.u64()?, u64::MAX);
    assert_eq!(dec.s64()?, i64::MIN);
    assert_eq!(dec.f64()?, -2.5);
    dec.unit()?;
    assert_eq!(dec.str()?, "héllo");
    assert_eq!(dec.bytes()?, &[0, 1, 2, 255]);
    dec.finish()
}

#[test]
fn test_nested_containers() -> Result<()> {
    let mut enc = Encoder::new();
    enc.map_begin()?;
    enc.variant_begin("items")?;
    enc.list_begin()?;
    enc.u64(1)?;
    enc.list_begin()?;
    enc.str("inner")?;
    enc.list_end()?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.map_end()?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    let mut map = dec.map()?;

    let (key, mut val) = map.next()?.expect("one entry");
    assert_eq!(key, "items");

    let mut list = val.list()?;
    assert_eq!(list.next()?.expect("first").u64()?, 1);
    let mut inner = list.next()?.expect("second").list()?;
    assert_eq!(inner.next()?.expect("inner item").str()?, "inner");
    assert!(inner.next()?.is_none());
    assert!(list.next()?.is_none());
    assert!(map.next()?.is_none());
    Ok(())
}

#[test]
fn test_skip_passes_over_containers() -> Result<()> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    enc.str("ignored")?;
    enc.f64(1.0)?;
    enc.list_end()?;
    enc.u64(7)?;

    let bytes = enc.into_bytes()?;
    let mut dec = Decoder::new(&bytes);
    dec.skip()?;
    assert_eq!(dec.u64()?, 7);
    Ok(())
}

#[test]
fn test_encoder_rejects_open_scope() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    assert_eq!(enc.into_bytes().unwrap_err(), Error::ScopeStillOpen);
}

#[test]
fn test_encoder_rejects_scalar_in_map() {
    let mut enc = Encoder::new();
    enc.map_begin().unwrap();
    assert_eq!(enc.u64(1).unwrap_err(), Error::InvalidMapEntry);
}

#[test]
fn test_encoder_variant_holds_exactly_one_item() {
    let mut enc = Encoder::new();
    enc.variant_begin("v").unwrap();
    assert_eq!(enc.variant_end().unwrap_err(), Error::EmptyVariant);

    enc.unit().unwrap();
    assert_eq!(enc.unit().unwrap_err(), Error::TooManyItems);
    enc.variant_end().unwrap();
    assert!(enc.into_bytes().is_ok());
}

#[test]
fn test_encoder_scope_mismatch() {
    let mut enc = Encoder::new();
    enc.list_begin().unwrap();
    match enc.map_end().unwrap_err() {
        Error::ScopeMismatch { expected, actual } => {
            assert_eq!(expected, pack::Scope::Map);
            assert_eq!(actual, pack::Scope::List);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(Encoder::new().list_end().unwrap_err(), Error::ScopeUnderflow);
}

#[test]
fn test_decoder_rejects_wrong_tag() {
    let mut enc = Encoder::new();
    enc.u64(3).unwrap();
    let bytes = enc.into_bytes().unwrap();

    let mut dec = Decoder::new(&bytes);
    assert_eq!(dec.str().unwrap_err(), Error::InvalidTag(Tag::U64 as u8));
}

#[test]
fn test_decoder_unknown_tag_and_truncation() {
    let mut dec = Decoder::new(&[0xFF]);
    assert_eq!(dec.peek_tag().unwrap_err(), Error::InvalidTag(0xFF));

    // string header claims 10 bytes, only 2 follow
    let mut dec = Decoder::new(&[Tag::String as u8, 10, 0, 0, 0, b'h', b'i']);
    assert_eq!(dec.str().unwrap_err(), Error::UnexpectedEnd);

    let mut dec = Decoder::new(&[]);
    assert_eq!(dec.u64().unwrap_err(), Error::UnexpectedEnd);
}

#[test]
fn test_decoder_invalid_utf8() {
    let mut dec = Decoder::new(&[Tag::String as u8, 2, 0, 0, 0, 0xC3, 0x28]);
    assert_eq!(dec.str().unwrap_err(), Error::InvalidUtf8);
}

// ============================================================================
//  FRAMES
// ============================================================================

fn sample_call() -> CallFrame {
    let mut kwargs = BTreeMap::new();
    kwargs.insert("scale".to_string(), vec![9, 9]);
    CallFrame {
        name: "add".into(),
        args: vec![vec![1], vec![], vec![2, 3]],
        kwargs,
    }
}

#[test]
fn test_call_frame_roundtrip() -> Result<()> {
    let call = sample_call();
    let bytes = Frame::from(call.clone()).to_bytes()?;
    assert_eq!(Frame::from_bytes(&bytes)?, Frame::Call(call));
    Ok(())
}

#[test]
fn test_reply_frames_roundtrip() -> Result<()> {
    let replies = [
        ReplyFrame::Value(b"5".to_vec()),
        ReplyFrame::Value(Vec::new()),
        ReplyFrame::Empty,
        ReplyFrame::Failed(Failure::new(FailureKind::UnknownFunction, "no function named 'x'")),
        ReplyFrame::Failed(Failure::new(FailureKind::Execution, "boom")),
        ReplyFrame::Failed(Failure::new(FailureKind::Serialization, "")),
        ReplyFrame::Failed(Failure::new(FailureKind::Protocol, "bad frame")),
    ];

    for reply in replies {
        let bytes = Frame::from(reply.clone()).to_bytes()?;
        assert_eq!(Frame::from_bytes(&bytes)?, Frame::Reply(reply));
    }
    Ok(())
}

#[test]
fn test_empty_value_is_not_empty_reply() -> Result<()> {
    let value = Frame::from(ReplyFrame::Value(Vec::new())).to_bytes()?;
    let empty = Frame::from(ReplyFrame::Empty).to_bytes()?;
    assert_ne!(value, empty);
    assert_eq!(Frame::from_bytes(&empty)?, Frame::Reply(ReplyFrame::Empty));
    Ok(())
}

#[test]
fn test_call_frame_missing_name() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Call")?;
    enc.map_begin()?;
    enc.variant_begin("args")?;
    enc.list_begin()?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    assert_eq!(Frame::from_bytes(&bytes).unwrap_err(), Error::MissingField("name"));
    Ok(())
}

#[test]
fn test_call_frame_skips_unknown_fields() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Call")?;
    enc.map_begin()?;
    enc.variant_begin("trace_id")?;
    enc.u64(42)?;
    enc.variant_end()?;
    enc.variant_begin("name")?;
    enc.str("noop")?;
    enc.variant_end()?;
    enc.variant_begin("args")?;
    enc.list_begin()?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    assert_eq!(Frame::from_bytes(&bytes)?, Frame::Call(CallFrame::new("noop")));
    Ok(())
}

#[test]
fn test_unknown_failure_kind() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Reply")?;
    enc.variant_begin("Failed")?;
    enc.map_begin()?;
    enc.variant_begin("kind")?;
    enc.variant_begin("Meltdown")?;
    enc.unit()?;
    enc.variant_end()?;
    enc.variant_end()?;
    enc.map_end()?;
    enc.variant_end()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    assert!(matches!(Frame::from_bytes(&bytes), Err(Error::UnknownVariant(_))));
    Ok(())
}

#[test]
fn test_truncated_and_trailing_frames() -> Result<()> {
    let bytes = Frame::from(sample_call()).to_bytes()?;

    for cut in 0..bytes.len() {
        assert!(Frame::from_bytes(&bytes[..cut]).is_err(), "prefix of {} bytes decoded", cut);
    }

    let mut padded = bytes.clone();
    padded.push(Tag::Unit as u8);
    assert_eq!(Frame::from_bytes(&padded).unwrap_err(), Error::TrailingBytes(1));
    Ok(())
}

#[test]
fn test_unknown_top_level_frame() -> Result<()> {
    let mut enc = Encoder::new();
    enc.variant_begin("Ping")?;
    enc.unit()?;
    enc.variant_end()?;
    let bytes = enc.into_bytes()?;

    assert!(matches!(Frame::from_bytes(&bytes), Err(Error::UnknownVariant(_))));
    Ok(())
}

/// Wraps an already-encoded body in a container header. The encoder refuses
/// to build malformed containers, so hostile input is assembled by hand.
fn container(tag: Tag, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag as u8];
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// A variant whose payload is every item `fill` writes, plus `tail`.
fn raw_variant(name: &str, fill: impl FnOnce(&mut Encoder) -> Result<()>, tail: &[u8]) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.str(name)?;
    fill(&mut enc)?;
    let mut body = enc.into_bytes()?;
    body.extend_from_slice(tail);
    Ok(container(Tag::Variant, &body))
}

#[test]
fn test_call_field_with_extra_item_rejected() -> Result<()> {
    let name = raw_variant("name", |e| { e.str("f")?; e.u64(1) }, &[])?;
    let args = raw_variant("args", |e| { e.list_begin()?; e.list_end() }, &[])?;
    let map = container(Tag::Map, &[name, args].concat());
    let bytes = raw_variant("Call", |_| Ok(()), &map)?;

    assert_eq!(Frame::from_bytes(&bytes), Err(Error::TrailingBytes(9)));
    Ok(())
}

#[test]
fn test_reply_value_with_extra_item_rejected() -> Result<()> {
    let value = raw_variant("Value", |e| { e.bytes(b"x")?; e.unit() }, &[])?;
    let bytes = raw_variant("Reply", |_| Ok(()), &value)?;

    assert_eq!(Frame::from_bytes(&bytes), Err(Error::TrailingBytes(1)));
    Ok(())
}

#[test]
fn test_failure_message_with_extra_item_rejected() -> Result<()> {
    let kind = raw_variant("kind", |e| { e.variant_begin("Execution")?; e.unit()?; e.variant_end() }, &[])?;
    let message = raw_variant("message", |e| { e.str("oops")?; e.bool(true) }, &[])?;
    let failed = raw_variant("Failed", |_| Ok(()), &container(Tag::Map, &[kind, message].concat()))?;
    let bytes = raw_variant("Reply", |_| Ok(()), &failed)?;

    assert_eq!(Frame::from_bytes(&bytes), Err(Error::TrailingBytes(1)));
    Ok(())
}
