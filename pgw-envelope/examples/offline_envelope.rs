//! Offline envelope example: seal a refund as the merchant, open it as the
//! gateway, answer with a bare JWE, and show how tampering is reported.
//!
//! Both key pairs are generated on the fly, so no key files are needed.
//!
//! # Running this example
//!
//! ```bash
//! cargo run --example offline_envelope
//! ```

#![allow(
    clippy::print_stdout,
    clippy::uninlined_format_args,
    reason = "examples are allowed to use println and simple formatting"
)]

use openssl::{pkey::PKey, rsa::Rsa};
use pgw_envelope::{
    EnvelopeCodec, KeyMaterial,
    api::{PaymentActionRequest, ProcessType},
    envelope::{classify, encode_request},
    keys::{PrivateKey, PrivateKeyFormat, PublicKey, load_private_key, load_public_key},
    xml::{build_request_xml, pretty_print},
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn generate_party() -> Result<(PrivateKey, PublicKey)> {
    let pkey = PKey::from_rsa(Rsa::generate(2048)?)?;
    let private = load_private_key(&pkey.private_key_to_pem_pkcs8()?, PrivateKeyFormat::Pem, None)?;
    let public = load_public_key(&pkey.public_key_to_pem()?)?;
    Ok((private, public))
}

fn main() -> Result<()> {
    println!("Payment Action envelope, offline\n");

    let (merchant_private, merchant_public) = generate_party()?;
    let (gateway_private, gateway_public) = generate_party()?;
    let merchant = EnvelopeCodec::new(KeyMaterial::new(merchant_private, gateway_public));
    let gateway = EnvelopeCodec::new(KeyMaterial::new(gateway_private, merchant_public.clone()));

    // Merchant side
    let request = PaymentActionRequest::new("704704000000211", "INV240101120000", ProcessType::Refund)
        .with_amount("10000");
    let sealed = merchant.seal(&build_request_xml(&request)?)?;
    println!("1. Sealed request ({} bytes on the wire)", sealed.jws.len());
    println!("   JWE segments: {}", sealed.jwe.split('.').count());
    println!("   JWS kind:     {}\n", classify(&sealed.jws)?);

    // Gateway side
    let opened = gateway.open(&sealed.jws)?;
    println!("2. Gateway opened a {} with kid {:?}", opened.kind, opened.key_id);
    println!("{}\n", pretty_print(&opened.xml));

    // The gateway may also answer with a bare JWE
    let reply_xml = "<PaymentProcessResponse><respCode>00</respCode>\
                     <respDesc>Success</respDesc></PaymentProcessResponse>";
    let reply = encode_request(
        reply_xml,
        &merchant_public,
        gateway.keys().private_key(),
        gateway.keys().key_id(),
    )?;
    let response = merchant.open(&format!("{}\r\n", reply.jwe))?;
    println!("3. Merchant opened a bare {}", response.kind);
    println!("{}\n", pretty_print(&response.xml));

    // Tampering
    let mut tampered = sealed.jws.clone().into_bytes();
    let at = tampered.len() - 10;
    tampered[at] = if tampered[at] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered)?;
    match gateway.open(&tampered) {
        Ok(_) => println!("4. Unexpected: tampered signature accepted"),
        Err(e) => println!("4. Tampered signature rejected at stage '{}': {}", e.stage(), e),
    }
    match gateway.open("a.b.c.d") {
        Ok(_) => println!("   Unexpected: four segments accepted"),
        Err(e) => println!("   Four segments rejected at stage '{}': {}", e.stage(), e),
    }

    Ok(())
}
