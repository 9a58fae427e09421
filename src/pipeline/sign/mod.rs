//! Digital signing of the finished PDF.
//!
//! [`SignerMode::Sandbox`] signs in-process: an invisible signature field
//! is added on the last page, the file is serialised with placeholder
//! values, and a detached CMS signature over the ByteRange is embedded.
//! [`SignerMode::External`] hands the file to a signing utility.

pub mod byterange;
pub mod external;
pub mod sandbox;

use crate::config::{ExternalSigner, SignerMode};
use crate::error::Xml2PdfError;
use chrono::{DateTime, FixedOffset};
use lopdf::Document;
use std::sync::Arc;
use tracing::info;

pub use sandbox::SandboxCredentials;

/// PDF date string, e.g. `D:20240305140709+03'00'`.
pub fn pdf_date(at: &DateTime<FixedOffset>) -> String {
    let offset = at.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    format!(
        "D:{}{}{:02}'{:02}'",
        at.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    )
}

/// Sign with local credentials. Blocking; call from `spawn_blocking`.
pub fn sign_with_credentials(
    pdf: &[u8],
    credentials: &SandboxCredentials,
    signer_name: &str,
    signed_at: &DateTime<FixedOffset>,
) -> Result<Vec<u8>, Xml2PdfError> {
    let fail = |detail: String| Xml2PdfError::SigningFailed { detail };
    let mut doc = Document::load_mem(pdf).map_err(|e| fail(format!("cannot read PDF: {}", e)))?;
    byterange::add_signature_field(&mut doc, signer_name, &pdf_date(signed_at))?;

    let mut out = Vec::with_capacity(pdf.len() + byterange::SIGNATURE_SIZE * 2 + 1024);
    doc.save_to(&mut out)
        .map_err(|e| fail(format!("cannot write PDF: {}", e)))?;

    let placeholder = byterange::locate(&out)?;
    let range = byterange::patch_byte_range(&mut out, &placeholder)?;
    let signature = credentials.sign_detached(&byterange::covered_bytes(&out, range))?;
    byterange::embed_signature(&mut out, &placeholder, &signature)?;

    info!(
        "Signed as '{}' ({} byte signature, subject {})",
        signer_name,
        signature.len(),
        credentials.subject()
    );
    Ok(out)
}

/// A signer ready for use.
///
/// Sandbox credentials are read and decrypted once, when the signer is
/// built, and shared by every conversion afterwards.
#[derive(Debug, Clone)]
pub enum Signer {
    Sandbox(Arc<SandboxCredentials>),
    External(ExternalSigner),
}

impl Signer {
    /// Prepare `mode`, loading sandbox credentials from disk.
    ///
    /// # Errors
    /// [`Xml2PdfError::CredentialsInvalid`] when the certificate or key
    /// cannot be read, parsed or decrypted.
    pub fn load(mode: &SignerMode) -> Result<Self, Xml2PdfError> {
        match mode {
            SignerMode::Sandbox {
                certificate,
                private_key,
                passphrase,
            } => {
                let credentials =
                    SandboxCredentials::load(certificate, private_key, passphrase.as_deref())?;
                info!("Loaded signing certificate for {}", credentials.subject());
                Ok(Signer::Sandbox(Arc::new(credentials)))
            }
            SignerMode::External(external) => Ok(Signer::External(external.clone())),
        }
    }

    /// Sign `pdf`.
    ///
    /// # Errors
    /// [`Xml2PdfError::SigningFailed`] or [`Xml2PdfError::SignerTimeout`].
    pub async fn sign(
        &self,
        pdf: Vec<u8>,
        signer_name: &str,
        signed_at: DateTime<FixedOffset>,
    ) -> Result<Vec<u8>, Xml2PdfError> {
        match self {
            Signer::Sandbox(credentials) => {
                let credentials = Arc::clone(credentials);
                let signer_name = signer_name.to_string();
                tokio::task::spawn_blocking(move || {
                    sign_with_credentials(&pdf, &credentials, &signer_name, &signed_at)
                })
                .await
                .map_err(|e| Xml2PdfError::Internal(format!("Signing task panicked: {}", e)))?
            }
            Signer::External(external) => external::sign(external, &pdf).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::overlay::tests::test_pdf;
    use chrono::TimeZone;
    use der::{Decode, DecodePem, Encode};
    use rsa::pkcs8::DecodePublicKey;
    use rsa::signature::Verifier;
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn sandbox() -> Signer {
        Signer::load(&SignerMode::sandbox(
            fixture("sandbox_cert.pem"),
            fixture("sandbox_key.pem"),
            Some("12345"),
        ))
        .unwrap()
    }

    fn at() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .unwrap()
    }

    #[test]
    fn pdf_date_format() {
        assert_eq!(pdf_date(&at()), "D:20240305140709+03'00'");
        let west = FixedOffset::west_opt(5 * 3600 + 30 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap();
        assert_eq!(pdf_date(&west), "D:20240102030405-05'30'");
    }

    #[tokio::test]
    async fn sandbox_signature_verifies_over_byte_range() {
        let signed = sandbox().sign(test_pdf(2), "ТЕСТ", at()).await.unwrap();

        let doc = Document::load_mem(&signed).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let sig = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .find(|d| {
                d.get(b"SubFilter").ok().and_then(|v| v.as_name().ok())
                    == Some(b"adbe.pkcs7.detached".as_slice())
            })
            .unwrap();
        let range: Vec<usize> = sig
            .get(b"ByteRange")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap() as usize)
            .collect();
        assert_eq!(range[0], 0);
        assert_eq!(range[2] + range[3], signed.len());

        let covered = byterange::covered_bytes(&signed, [range[0], range[1], range[2], range[3]]);
        let digest = Sha256::digest(&covered);

        let contents = sig.get(b"Contents").unwrap().as_str().unwrap();
        // The DER value is followed by zero padding.
        let mut reader = der::SliceReader::new(contents).unwrap();
        let info = cms::content_info::ContentInfo::decode(&mut reader).unwrap();
        let signed_data: cms::signed_data::SignedData = info.content.decode_as().unwrap();
        let signer_info = signed_data.signer_infos.0.iter().next().unwrap();

        let attrs = signer_info.signed_attrs.as_ref().unwrap();
        let message_digest = attrs
            .iter()
            .find(|a| a.oid == const_oid::db::rfc5911::ID_MESSAGE_DIGEST)
            .unwrap();
        let value: der::asn1::OctetString =
            message_digest.values.iter().next().unwrap().decode_as().unwrap();
        assert_eq!(value.as_bytes(), digest.as_slice());

        let pem = std::fs::read(fixture("sandbox_cert.pem")).unwrap();
        let cert = x509_cert::Certificate::from_pem(pem).unwrap();
        let public = rsa::RsaPublicKey::from_public_key_der(
            &cert.tbs_certificate.subject_public_key_info.to_der().unwrap(),
        )
        .unwrap();
        let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public);
        let signature =
            rsa::pkcs1v15::Signature::try_from(signer_info.signature.as_bytes()).unwrap();
        verifier.verify(&attrs.to_der().unwrap(), &signature).unwrap();
    }

    #[test]
    fn bad_credentials_fail_when_loading() {
        let mode = SignerMode::sandbox("/nonexistent/c.pem", "/nonexistent/k.pem", None);
        let err = Signer::load(&mode).unwrap_err();
        assert!(matches!(err, Xml2PdfError::CredentialsInvalid { .. }));
    }

    #[tokio::test]
    async fn loaded_credentials_sign_repeatedly() {
        let signer = sandbox();
        let Signer::Sandbox(credentials) = &signer else {
            panic!("expected sandbox signer");
        };
        for pages in 1..=2 {
            let signed = signer.sign(test_pdf(pages), "ТЕСТ", at()).await.unwrap();
            assert_eq!(Document::load_mem(&signed).unwrap().get_pages().len(), pages);
        }
        let copy = signer.clone();
        let Signer::Sandbox(shared) = &copy else {
            panic!("expected sandbox signer");
        };
        assert!(Arc::ptr_eq(credentials, shared));
    }

    #[tokio::test]
    async fn non_pdf_input_is_signing_failure() {
        let err = sandbox().sign(b"nope".to_vec(), "ТЕСТ", at()).await.unwrap_err();
        assert!(matches!(err, Xml2PdfError::SigningFailed { .. }));
    }
}
