//! In-process signing with a local certificate and RSA key.
//!
//! Produces a detached CMS `SignedData` (`adbe.pkcs7.detached`) over the
//! document's ByteRange with SHA-256 and RSA PKCS#1 v1.5.

use crate::error::Xml2PdfError;
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use const_oid::db::rfc5911::ID_DATA;
use const_oid::db::rfc5912::ID_SHA_256;
use der::{DecodePem, Encode};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use std::fmt;
use std::path::Path;
use x509_cert::Certificate;

/// A certificate and its private key.
#[derive(Clone)]
pub struct SandboxCredentials {
    certificate: Certificate,
    key: RsaPrivateKey,
}

impl fmt::Debug for SandboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxCredentials")
            .field("subject", &self.subject())
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SandboxCredentials {
    /// Load a PEM certificate and a PEM PKCS#8 key, encrypted when
    /// `passphrase` is given.
    pub fn load(
        certificate: &Path,
        private_key: &Path,
        passphrase: Option<&str>,
    ) -> Result<Self, Xml2PdfError> {
        let invalid = |path: &Path, detail: String| Xml2PdfError::CredentialsInvalid {
            path: path.to_path_buf(),
            detail,
        };

        let cert_pem = std::fs::read(certificate).map_err(|e| invalid(certificate, e.to_string()))?;
        let certificate_parsed = Certificate::from_pem(&cert_pem)
            .map_err(|e| invalid(certificate, format!("not a PEM certificate: {}", e)))?;

        let key_pem = std::fs::read_to_string(private_key)
            .map_err(|e| invalid(private_key, e.to_string()))?;
        let key = if key_pem.contains("ENCRYPTED PRIVATE KEY") {
            let passphrase = passphrase
                .ok_or_else(|| invalid(private_key, "key is encrypted but no passphrase given".into()))?;
            RsaPrivateKey::from_pkcs8_encrypted_pem(&key_pem, passphrase)
                .map_err(|e| invalid(private_key, format!("cannot decrypt key: {}", e)))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(&key_pem)
                .map_err(|e| invalid(private_key, format!("not a PKCS#8 RSA key: {}", e)))?
        };

        Ok(Self {
            certificate: certificate_parsed,
            key,
        })
    }

    /// Certificate subject, RFC 4514 form.
    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// DER `ContentInfo` holding a detached signature over `content`.
    pub fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>, Xml2PdfError> {
        let fail = |detail: String| Xml2PdfError::SigningFailed { detail };

        let digest = Sha256::digest(content);
        let signer = SigningKey::<Sha256>::new(self.key.clone());
        let digest_algorithm = AlgorithmIdentifierOwned {
            oid: ID_SHA_256,
            parameters: None,
        };
        let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: self.certificate.tbs_certificate.issuer.clone(),
            serial_number: self.certificate.tbs_certificate.serial_number.clone(),
        });
        let econtent = EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        };

        let signer_info = SignerInfoBuilder::new(
            &signer,
            sid,
            digest_algorithm.clone(),
            &econtent,
            Some(digest.as_slice()),
        )
        .map_err(|e| fail(format!("signer info: {:?}", e)))?;

        let mut builder = SignedDataBuilder::new(&econtent);
        builder
            .add_digest_algorithm(digest_algorithm)
            .map_err(|e| fail(format!("digest algorithm: {:?}", e)))?;
        builder
            .add_certificate(CertificateChoices::Certificate(self.certificate.clone()))
            .map_err(|e| fail(format!("certificate: {:?}", e)))?;
        builder
            .add_signer_info::<SigningKey<Sha256>, rsa::pkcs1v15::Signature>(signer_info)
            .map_err(|e| fail(format!("signer: {:?}", e)))?;
        let content_info = builder
            .build()
            .map_err(|e| fail(format!("signed data: {:?}", e)))?;

        content_info
            .to_der()
            .map_err(|e| fail(format!("DER encoding: {}", e)))
    }
}
