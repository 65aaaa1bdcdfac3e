use crate::protocol::body::{DecodedBody, content_type, decode, decode_event, parse_parameters};
use crate::protocol::plist::{self, PlistValue};
use crate::plist_dict;

const PLAYING_EVENT: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>category</key>
    <string>video</string>
    <key>sessionID</key>
    <integer>3</integer>
    <key>state</key>
    <string>playing</string>
</dict>
</plist>"#;

#[test]
fn test_decode_binary_plist() {
    let doc = plist_dict! { "duration" => 83.1, "rate" => 1.0 };
    let bytes = plist::encode(&doc).unwrap();

    let decoded = decode(&bytes, Some(content_type::BINARY_PLIST));
    assert_eq!(decoded, DecodedBody::Document(doc));
    assert_eq!(decoded.get("rate"), Some(&PlistValue::Real(1.0)));
}

#[test]
fn test_decode_xml_plist() {
    let decoded = decode(PLAYING_EVENT, Some(content_type::XML_PLIST));
    assert_eq!(
        decoded.get("state").and_then(PlistValue::as_str),
        Some("playing")
    );
    assert_eq!(decoded.get("sessionID"), Some(&PlistValue::Integer(3)));
}

#[test]
fn test_decode_text_parameters() {
    let decoded = decode(
        b"duration: 83.124794\nposition: 14.467000\n",
        Some(content_type::TEXT_PARAMETERS),
    );
    let params = decoded.as_parameters().unwrap();
    assert_eq!(params.len(), 2);
    assert!((params["duration"] - 83.124_794).abs() < f64::EPSILON);
    assert!((params["position"] - 14.467).abs() < f64::EPSILON);
}

#[test]
fn test_unknown_type_passes_through() {
    let body = b"\x00\x01not a document";
    assert_eq!(
        decode(body, Some("application/octet-stream")),
        DecodedBody::Raw(body.to_vec())
    );
    assert_eq!(decode(body, None), DecodedBody::Raw(body.to_vec()));
}

#[test]
fn test_media_type_match_is_exact() {
    let decoded = decode(b"a: 1", Some("text/parameters; charset=utf-8"));
    assert_eq!(decoded.as_raw(), Some(&b"a: 1"[..]));
}

#[test]
fn test_corrupt_plist_falls_back_to_raw() {
    let decoded = decode(b"bplist00garbage", Some(content_type::BINARY_PLIST));
    assert_eq!(decoded.as_raw(), Some(&b"bplist00garbage"[..]));

    let decoded = decode(b"<plist><dict>", Some(content_type::XML_PLIST));
    assert!(decoded.as_raw().is_some());
}

#[test]
fn test_forged_binary_trailer_falls_back_to_raw() {
    let mut body = b"bplist00\x09\x08".to_vec();
    body.extend_from_slice(&[0, 0, 0, 0, 0, 0, 1, 1]);
    body.extend_from_slice(&(1u64 << 62).to_be_bytes());
    body.extend_from_slice(&0u64.to_be_bytes());
    body.extend_from_slice(&9u64.to_be_bytes());

    let decoded = decode(&body, Some(content_type::BINARY_PLIST));
    assert_eq!(decoded, DecodedBody::Raw(body));
}

#[test]
fn test_event_with_unrepresentable_date_is_raw() {
    let body: &[u8] = b"<plist><dict><key>state</key><string>playing</string>\
<key>d</key><date>99999999999999999-01-01T00:00:00Z</date></dict></plist>";
    let decoded = decode_event(body, Some(content_type::XML_PLIST));
    assert_eq!(decoded, DecodedBody::Raw(body.to_vec()));
}

#[test]
fn test_event_decodes_both_xml_labels() {
    for label in [content_type::XML_PLIST, content_type::APPLE_PLIST] {
        let decoded = decode_event(PLAYING_EVENT, Some(label));
        assert_eq!(
            decoded.get("state").and_then(PlistValue::as_str),
            Some("playing")
        );
    }
}

#[test]
fn test_event_binary_plist_is_not_decoded() {
    let bytes = plist::encode(&plist_dict! { "state" => "paused" }).unwrap();
    let decoded = decode_event(&bytes, Some(content_type::BINARY_PLIST));
    assert_eq!(decoded, DecodedBody::Raw(bytes));
}

#[test]
fn test_parameters_permissive_values() {
    let params = parse_parameters("  \nrate: fast\nduration: 12.5s\nbare line\n\nposition: -3\r\n");
    assert!(params["rate"].is_nan());
    assert!((params["duration"] - 12.5).abs() < f64::EPSILON);
    assert!(params["bare line"].is_nan());
    assert!((params["position"] + 3.0).abs() < f64::EPSILON);
    assert_eq!(params.len(), 4);
}

#[test]
fn test_parameters_split_on_first_separator() {
    let params = parse_parameters("a: 1: 2");
    assert!((params["a"] - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_parameters_exponent_prefix() {
    let params = parse_parameters("a: 1e3x\nb: 2ex\nc: .5\nd: .");
    assert!((params["a"] - 1000.0).abs() < f64::EPSILON);
    assert!((params["b"] - 2.0).abs() < f64::EPSILON);
    assert!((params["c"] - 0.5).abs() < f64::EPSILON);
    assert!(params["d"].is_nan());
}

#[test]
fn test_parameters_infinity_spelling() {
    let params = parse_parameters("a: Infinity\nb: -Infinityx\nc: inf\nd: infinity\ne: nan\nf: NaN\ng: +Infinity");
    assert_eq!(params["a"], f64::INFINITY);
    assert_eq!(params["b"], f64::NEG_INFINITY);
    assert!(params["c"].is_nan());
    assert!(params["d"].is_nan());
    assert!(params["e"].is_nan());
    assert!(params["f"].is_nan());
    assert_eq!(params["g"], f64::INFINITY);
}

#[test]
fn test_empty_parameters() {
    assert!(parse_parameters("").is_empty());
    assert!(parse_parameters("\n\n").is_empty());
}
