//! Shared key fixtures for unit tests.
//!
//! RSA-2048 generation is slow, so each party's keys are generated once per test
//! binary.

use std::sync::LazyLock;

use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    pkcs12::Pkcs12,
    pkey::PKey,
    rsa::Rsa,
    symm::Cipher,
    x509::{X509Builder, X509NameBuilder},
};

use crate::keys::{KeyMaterial, PrivateKey, PrivateKeyFormat, PublicKey, load_private_key, load_public_key};

pub(crate) struct Fixture {
    pub passphrase: String,
    pub pkcs12: Vec<u8>,
    pub private_pem: Vec<u8>,
    pub encrypted_private_pem: Vec<u8>,
    pub public_pem: Vec<u8>,
    pub certificate_pem: Vec<u8>,
    pub certificate_der: Vec<u8>,
}

impl Fixture {
    fn generate(common_name: &str) -> Self {
        let passphrase = format!("{common_name}-pass");
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(365).unwrap()).unwrap();
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
            private_pem: pkey.private_key_to_pem_pkcs8().unwrap(),
            encrypted_private_pem: pkey
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase.as_bytes())
                .unwrap(),
            public_pem: pkey.public_key_to_pem().unwrap(),
            certificate_pem: certificate.to_pem().unwrap(),
            certificate_der: certificate.to_der().unwrap(),
            passphrase,
        }
    }

    pub fn private_key(&self) -> PrivateKey {
        load_private_key(&self.private_pem, PrivateKeyFormat::Pem, None).unwrap()
    }

    pub fn public_key(&self) -> PublicKey {
        load_public_key(&self.public_pem).unwrap()
    }
}

static MERCHANT: LazyLock<Fixture> = LazyLock::new(|| Fixture::generate("merchant"));
static GATEWAY: LazyLock<Fixture> = LazyLock::new(|| Fixture::generate("gateway"));

/// Merchant fixture.
pub(crate) fn fixture() -> &'static Fixture {
    &MERCHANT
}

/// Merchant and gateway fixtures.
pub(crate) fn fixture_pair() -> (&'static Fixture, &'static Fixture) {
    (&MERCHANT, &GATEWAY)
}

/// Keys as held by the merchant: own private key, gateway public key.
pub(crate) fn merchant_keys() -> KeyMaterial {
    KeyMaterial::new(MERCHANT.private_key(), GATEWAY.public_key())
}

/// Keys as held by the gateway: own private key, merchant public key.
pub(crate) fn gateway_keys() -> KeyMaterial {
    KeyMaterial::new(GATEWAY.private_key(), MERCHANT.public_key())
}
