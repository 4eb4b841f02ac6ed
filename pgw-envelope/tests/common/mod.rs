//! Shared fixtures for integration tests.
//!
//! Keys are loaded through the public API from PKCS#12 containers and DER
//! certificates, the formats the gateway actually hands out.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::LazyLock;

use axum::Router;
use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkcs12::Pkcs12,
    pkey::PKey,
    rsa::Rsa,
    x509::{X509Builder, X509NameBuilder},
};
use pgw_envelope::keys::{
    KeyMaterial, PrivateKey, PrivateKeyFormat, PublicKey, load_private_key, load_public_key,
};
use tokio::net::TcpListener;

/// One party's key material as files would hold it.
pub struct Party {
    pub passphrase: String,
    pub pkcs12: Vec<u8>,
    pub certificate_der: Vec<u8>,
    pub certificate_pem: Vec<u8>,
}

impl Party {
    fn generate(common_name: &str) -> Self {
        let passphrase = format!("{common_name}-secret");
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        let certificate = builder.build();

        let pkcs12 = Pkcs12::builder()
            .name(common_name)
            .pkey(&pkey)
            .cert(&certificate)
            .build2(&passphrase)
            .unwrap()
            .to_der()
            .unwrap();

        Self {
            pkcs12,
            certificate_der: certificate.to_der().unwrap(),
            certificate_pem: certificate.to_pem().unwrap(),
            passphrase,
        }
    }

    pub fn private_key(&self) -> PrivateKey {
        load_private_key(&self.pkcs12, PrivateKeyFormat::Pkcs12, Some(self.passphrase.as_str())).unwrap()
    }

    pub fn public_key(&self) -> PublicKey {
        load_public_key(&self.certificate_der).unwrap()
    }
}

pub static MERCHANT: LazyLock<Party> = LazyLock::new(|| Party::generate("merchant.test"));
pub static GATEWAY: LazyLock<Party> = LazyLock::new(|| Party::generate("gateway.test"));

/// Merchant private key with the gateway certificate.
pub fn merchant_keys() -> KeyMaterial {
    KeyMaterial::new(MERCHANT.private_key(), GATEWAY.public_key())
}

/// Gateway private key with the merchant certificate.
pub fn gateway_keys() -> KeyMaterial {
    KeyMaterial::new(GATEWAY.private_key(), MERCHANT.public_key())
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
