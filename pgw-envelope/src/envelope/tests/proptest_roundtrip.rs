use proptest::prelude::*;

use crate::{
    api::{PaymentActionRequest, ProcessType},
    envelope::{EnvelopeCodec, EnvelopeKind, classify},
    error::HarnessError,
    test_support::{gateway_keys, merchant_keys},
    xml::{build_request_xml, parse_response_xml},
};

fn process_type() -> impl Strategy<Value = ProcessType> {
    prop_oneof![
        Just(ProcessType::Inquiry),
        Just(ProcessType::Refund),
        Just(ProcessType::Void),
    ]
}

proptest! {
    // RSA operations are slow; a handful of cases is enough.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_request_roundtrip(
        merchant_id in "[0-9]{15}",
        invoice_no in "[ -~]{0,40}",
        amount in "[0-9]{0,8}",
        process_type in process_type(),
        notify_url in "(https://[a-z]{1,10}\\.com/[a-z?=&]{0,20})?",
    ) {
        let request = PaymentActionRequest::new(merchant_id.clone(), invoice_no.clone(), process_type)
            .with_amount(amount.clone())
            .with_notify_url(notify_url);
        let xml = build_request_xml(&request).expect("build xml");

        let sealed = EnvelopeCodec::new(merchant_keys()).seal(&xml).expect("seal");
        let opened = EnvelopeCodec::new(gateway_keys()).open(&sealed.jws).expect("open");
        prop_assert_eq!(&opened.xml, &xml);

        let document = parse_response_xml(&opened.xml).expect("parse xml");
        prop_assert_eq!(document.root.child_text("merchantID"), Some(merchant_id));
        prop_assert_eq!(document.root.child_text("actionAmount"), Some(amount));
        let process_type_text = document.root.child_text("processType");
        prop_assert_eq!(
            process_type_text.as_deref(),
            Some(process_type.code())
        );
    }

    #[test]
    fn test_arbitrary_text_roundtrip(payload in "\\PC{0,256}") {
        let sealed = EnvelopeCodec::new(merchant_keys()).seal(&payload).expect("seal");
        let opened = EnvelopeCodec::new(gateway_keys()).open(&sealed.jws).expect("open");
        prop_assert_eq!(opened.xml, payload);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_classification_depends_only_on_segment_count(
        segments in prop::collection::vec("[A-Za-z0-9_-]{0,12}", 1..8),
    ) {
        let text = segments.join(".");
        match (segments.len(), classify(&text)) {
            (3, Ok(kind)) => prop_assert_eq!(kind, EnvelopeKind::Jws),
            (5, Ok(kind)) => prop_assert_eq!(kind, EnvelopeKind::Jwe),
            (_, Err(HarnessError::MalformedEnvelope(_))) => {
                prop_assert!(segments.len() != 3 && segments.len() != 5);
            }
            (count, other) => prop_assert!(false, "{count} segments gave {other:?}"),
        }
    }
}
