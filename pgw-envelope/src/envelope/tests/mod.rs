use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Value, json};

use super::*;
use crate::test_support::{gateway_keys, merchant_keys};

mod proptest_roundtrip;

const XML: &str = "<PaymentProcessResponse><version>3.8</version><respCode>00</respCode></PaymentProcessResponse>";

/// Response as the gateway would send it: encrypted to the merchant, signed by
/// the gateway.
fn gateway_response(xml: &str) -> SealedEnvelope {
    let gateway = gateway_keys();
    encode_request(xml, gateway.public_key(), gateway.private_key(), "1").unwrap()
}

fn segment_json(compact: &str, index: usize) -> Value {
    let segment = compact.split('.').nth(index).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
}

/// Flips one bit in the middle of a decoded segment and re-encodes it.
fn tamper(compact: &str, index: usize) -> String {
    let mut segments: Vec<String> = compact.split('.').map(str::to_owned).collect();
    let mut bytes = URL_SAFE_NO_PAD.decode(&segments[index]).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    segments[index] = URL_SAFE_NO_PAD.encode(bytes);
    segments.join(".")
}

fn replace_segment(compact: &str, index: usize, value: &Value) -> String {
    let mut segments: Vec<String> = compact.split('.').map(str::to_owned).collect();
    segments[index] = URL_SAFE_NO_PAD.encode(value.to_string());
    segments.join(".")
}

#[test]
fn test_sealed_envelope_shape() {
    let keys = merchant_keys();
    let sealed = EnvelopeCodec::new(keys).seal(XML).unwrap();

    assert_eq!(sealed.xml, XML);
    assert_eq!(sealed.jwe.split('.').count(), 5);
    assert_eq!(sealed.jws.split('.').count(), 3);
    assert_eq!(sealed.to_string(), sealed.jws);
    assert_eq!(sealed.as_str(), sealed.jws);
}

#[test]
fn test_jws_payload_is_jwe_string() {
    let sealed = EnvelopeCodec::new(merchant_keys()).seal(XML).unwrap();
    let payload = sealed.jws.split('.').nth(1).unwrap();
    let decoded = URL_SAFE_NO_PAD.decode(payload).unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), sealed.jwe);
}

#[test]
fn test_protected_headers() {
    let sealed = EnvelopeCodec::new(merchant_keys()).seal(XML).unwrap();
    assert_eq!(segment_json(&sealed.jws, 0), json!({"alg": "PS256", "kid": "1"}));
    assert_eq!(
        segment_json(&sealed.jwe, 0),
        json!({"alg": "RSA-OAEP", "enc": "A256GCM", "kid": "1"})
    );
}

#[test]
fn test_custom_key_id_in_both_headers() {
    let codec = EnvelopeCodec::new(merchant_keys().with_key_id("k-7"));
    let sealed = codec.seal(XML).unwrap();
    assert_eq!(segment_json(&sealed.jws, 0)["kid"], "k-7");
    assert_eq!(segment_json(&sealed.jwe, 0)["kid"], "k-7");
}

#[test]
fn test_gateway_opens_merchant_request() {
    let sealed = EnvelopeCodec::new(merchant_keys()).seal(XML).unwrap();
    let opened = EnvelopeCodec::new(gateway_keys()).open(&sealed.jws).unwrap();
    assert_eq!(opened.kind, EnvelopeKind::Jws);
    assert_eq!(opened.xml, XML);
    assert_eq!(opened.jwe, sealed.jwe);
    assert_eq!(opened.key_id.as_deref(), Some("1"));
}

#[test]
fn test_merchant_opens_jws_response() {
    let response = gateway_response(XML);
    let opened = EnvelopeCodec::new(merchant_keys()).open(&response.jws).unwrap();
    assert_eq!(opened.kind, EnvelopeKind::Jws);
    assert_eq!(opened.xml, XML);
}

#[test]
fn test_merchant_opens_bare_jwe_response() {
    let response = gateway_response(XML);
    let opened = EnvelopeCodec::new(merchant_keys()).open(&response.jwe).unwrap();
    assert_eq!(opened.kind, EnvelopeKind::Jwe);
    assert_eq!(opened.xml, XML);
}

#[test]
fn test_surrounding_whitespace_is_ignored() {
    let response = gateway_response(XML);
    let padded = format!("\n  {}\r\n", response.jws);
    let opened = EnvelopeCodec::new(merchant_keys()).open(&padded).unwrap();
    assert_eq!(opened.xml, XML);
}

#[test]
fn test_classify_by_segment_count() {
    assert_eq!(classify("x.y.z").unwrap(), EnvelopeKind::Jws);
    assert_eq!(classify("....").unwrap(), EnvelopeKind::Jwe);
    for text in ["", "plain", "a.b", "a.b.c.d", "a.b.c.d.e.f", "<xml/>"] {
        let err = classify(text).unwrap_err();
        assert!(matches!(err, HarnessError::MalformedEnvelope(_)), "{text:?}");
        assert!(err.to_string().contains("not in compact JWS or JWE format"));
    }
}

#[test]
fn test_decode_rejects_other_segment_counts() {
    let keys = merchant_keys();
    let err = EnvelopeCodec::new(keys).open("<html>Bad Gateway</html>").unwrap_err();
    assert!(matches!(err, HarnessError::MalformedEnvelope(_)));
}

#[test]
fn test_tampered_signature_fails_verification() {
    let response = gateway_response(XML);
    let tampered = tamper(&response.jws, 2);
    let err = EnvelopeCodec::new(merchant_keys()).open(&tampered).unwrap_err();
    assert!(matches!(err, HarnessError::SignatureVerification(_)), "{err}");
}

#[test]
fn test_tampered_jws_payload_fails_verification() {
    let response = gateway_response(XML);
    let tampered = tamper(&response.jws, 1);
    let err = EnvelopeCodec::new(merchant_keys()).open(&tampered).unwrap_err();
    assert!(matches!(err, HarnessError::SignatureVerification(_)), "{err}");
}

#[test]
fn test_wrong_sender_key_fails_verification() {
    // Signed by the merchant, but the merchant expects the gateway's signature.
    let own = EnvelopeCodec::new(merchant_keys()).seal(XML).unwrap();
    let err = EnvelopeCodec::new(merchant_keys()).open(&own.jws).unwrap_err();
    assert!(matches!(err, HarnessError::SignatureVerification(_)), "{err}");
}

#[test]
fn test_tampered_ciphertext_fails_decryption() {
    let response = gateway_response(XML);
    let tampered = tamper(&response.jwe, 3);
    let err = EnvelopeCodec::new(merchant_keys()).open(&tampered).unwrap_err();
    assert!(matches!(err, HarnessError::Decryption(_)), "{err}");
}

#[test]
fn test_tampered_tag_fails_decryption() {
    let response = gateway_response(XML);
    let tampered = tamper(&response.jwe, 4);
    let err = EnvelopeCodec::new(merchant_keys()).open(&tampered).unwrap_err();
    assert!(matches!(err, HarnessError::Decryption(_)), "{err}");
}

#[test]
fn test_wrong_recipient_key_fails_decryption() {
    // Encrypted to the gateway, but opened with the merchant key.
    let request = EnvelopeCodec::new(merchant_keys()).seal(XML).unwrap();
    let err = EnvelopeCodec::new(merchant_keys()).open(&request.jwe).unwrap_err();
    assert!(matches!(err, HarnessError::Decryption(_)), "{err}");
}

#[test]
fn test_unsupported_content_encryption_is_rejected() {
    let response = gateway_response(XML);
    let header = json!({"alg": "RSA-OAEP", "enc": "A128CBC-HS256", "kid": "1"});
    let altered = replace_segment(&response.jwe, 0, &header);
    let err = EnvelopeCodec::new(merchant_keys()).open(&altered).unwrap_err();
    assert!(matches!(err, HarnessError::Decryption(_)));
    assert!(err.to_string().contains("unsupported algorithm"), "{err}");
}

#[test]
fn test_unsupported_key_algorithm_is_rejected() {
    let response = gateway_response(XML);
    let header = json!({"alg": "RSA-OAEP-256", "enc": "A256GCM"});
    let altered = replace_segment(&response.jwe, 0, &header);
    let err = EnvelopeCodec::new(merchant_keys()).open(&altered).unwrap_err();
    assert!(err.to_string().contains("RSA-OAEP-256/A256GCM"), "{err}");
}

#[test]
fn test_signed_non_jwe_payload_is_malformed() {
    let gateway = gateway_keys();
    let mut header = JwsHeader::new();
    header.set_key_id("1");
    let jws = jws::serialize_compact(b"<plain/>", &header, gateway.private_key().signer()).unwrap();

    let err = EnvelopeCodec::new(merchant_keys()).open(&jws).unwrap_err();
    assert!(matches!(err, HarnessError::MalformedEnvelope(_)), "{err}");
}

#[test]
fn test_signed_jwe_with_trailing_newline_opens() {
    let gateway = gateway_keys();
    let response = gateway_response(XML);
    let mut header = JwsHeader::new();
    header.set_key_id("1");
    let payload = format!("{}\n", response.jwe);
    let jws =
        jws::serialize_compact(payload.as_bytes(), &header, gateway.private_key().signer()).unwrap();

    let opened = EnvelopeCodec::new(merchant_keys()).open(&jws).unwrap();
    assert_eq!(opened.kind, EnvelopeKind::Jws);
    assert_eq!(opened.jwe, response.jwe);
    assert_eq!(opened.xml, XML);
}

#[test]
fn test_non_utf8_plaintext_fails_decryption() {
    let merchant = merchant_keys();
    let mut header = JweHeader::new();
    header.set_content_encryption(JWE_ENCRYPTION);
    let jwe = jwe::serialize_compact(
        &[0xff, 0xfe, 0x00],
        &header,
        merchant.private_key().public_key().encrypter(),
    )
    .unwrap();

    let err = EnvelopeCodec::new(merchant).open(&jwe).unwrap_err();
    assert!(matches!(err, HarnessError::Decryption(_)));
    assert!(err.to_string().contains("UTF-8"));
}

#[test]
fn test_each_seal_is_fresh() {
    let codec = EnvelopeCodec::new(merchant_keys());
    let first = codec.seal(XML).unwrap();
    let second = codec.seal(XML).unwrap();
    assert_ne!(first.jwe, second.jwe);
    assert_ne!(first.jws, second.jws);
}
