//! Signing through an external utility (e.g. CryptoPro `csptest`).
//!
//! The utility reads the unsigned PDF from a file and writes the signed one
//! to another. The passphrase travels over stdin, never the command line.

use crate::config::ExternalSigner;
use crate::error::Xml2PdfError;
use encoding_rs::{IBM866, WINDOWS_1251};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Decode process diagnostics: UTF-8, then Windows-1251, then CP866.
///
/// The first decoding without replacement characters wins; if none is
/// clean the Windows-1251 decoding is returned.
pub fn decode_diagnostics(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    let (cp1251, _, cp1251_lossy) = WINDOWS_1251.decode(bytes);
    if !cp1251_lossy {
        return cp1251.into_owned();
    }
    let (cp866, _, cp866_lossy) = IBM866.decode(bytes);
    if !cp866_lossy {
        return cp866.into_owned();
    }
    cp1251.into_owned()
}

/// Run the signer over `pdf` and return the signed bytes.
///
/// # Errors
/// * [`Xml2PdfError::SignerTimeout`] when the process outlives its budget
///   (the child is killed).
/// * [`Xml2PdfError::SigningFailed`] on a non-zero exit, a missing or empty
///   output file, or when the process cannot be started.
pub async fn sign(signer: &ExternalSigner, pdf: &[u8]) -> Result<Vec<u8>, Xml2PdfError> {
    let fail = |detail: String| Xml2PdfError::SigningFailed { detail };

    let work = tempfile::tempdir().map_err(|e| fail(format!("cannot create work dir: {}", e)))?;
    let input = work.path().join("unsigned.pdf");
    let output = work.path().join("signed.pdf");
    tokio::fs::write(&input, pdf)
        .await
        .map_err(|e| fail(format!("cannot write signer input: {}", e)))?;

    let mut cmd = Command::new(&signer.program);
    cmd.args(&signer.args)
        .arg("-in")
        .arg(&input)
        .arg("-out")
        .arg(&output)
        .arg("-my")
        .arg(&signer.certificate_store)
        .arg("-add")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        "Running signer {} (store '{}')",
        signer.program.display(),
        signer.certificate_store
    );
    let mut child = cmd
        .spawn()
        .map_err(|e| fail(format!("cannot start '{}': {}", signer.program.display(), e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        let mut line = signer.passphrase.clone().unwrap_or_default();
        line.push('\n');
        // A signer that never reads stdin closes the pipe; that is not an error.
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            debug!("Signer did not read stdin: {}", e);
        }
        drop(stdin);
    }

    let result = tokio::time::timeout(
        Duration::from_secs(signer.timeout_secs),
        child.wait_with_output(),
    )
    .await;
    let status = match result {
        Ok(output) => output.map_err(|e| fail(format!("signer I/O error: {}", e)))?,
        Err(_) => {
            warn!("Signer exceeded {}s, killed", signer.timeout_secs);
            return Err(Xml2PdfError::SignerTimeout {
                secs: signer.timeout_secs,
            });
        }
    };

    if !status.status.success() {
        let stderr = decode_diagnostics(&status.stderr);
        let stdout = decode_diagnostics(&status.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(fail(format!("signer exited with {}: {}", status.status, message)));
    }

    let signed = match tokio::fs::read(&output).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return Err(fail("signer produced an empty file".into())),
        Err(e) => return Err(fail(format!("signer produced no output: {}", e))),
    };
    info!("External signer produced {} bytes", signed.len());
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_diagnostics_pass_through() {
        assert_eq!(decode_diagnostics("Ошибка".as_bytes()), "Ошибка");
    }

    #[test]
    fn cp1251_diagnostics_are_decoded() {
        let (bytes, _, _) = WINDOWS_1251.encode("Ошибка подписи");
        assert_eq!(decode_diagnostics(&bytes), "Ошибка подписи");
    }

    #[test]
    fn undecodable_bytes_still_produce_text() {
        let text = decode_diagnostics(&[0x98, 0x41]);
        assert!(text.ends_with('A'));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("signer.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn signer(program: PathBuf) -> ExternalSigner {
            ExternalSigner::new("uMy")
                .program(program)
                .args(Vec::<String>::new())
                .passphrase("secret")
                .timeout_secs(5)
        }

        #[tokio::test]
        async fn copies_output_and_feeds_passphrase_on_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let stdin_file = dir.path().join("stdin.txt");
            let args_file = dir.path().join("args.txt");
            let body = format!(
                "cat > {}\nprintf '%s ' \"$@\" > {}\ncp \"$2\" \"$4\"",
                stdin_file.display(),
                args_file.display()
            );
            let program = script(dir.path(), &body);

            let signed = sign(&signer(program), b"%PDF-1.7 test").await.unwrap();
            assert_eq!(signed, b"%PDF-1.7 test");
            assert_eq!(std::fs::read_to_string(&stdin_file).unwrap(), "secret\n");
            let args = std::fs::read_to_string(&args_file).unwrap();
            assert!(args.contains("-my uMy -add"), "got: {args}");
            assert!(!args.contains("secret"));
        }

        #[tokio::test]
        async fn non_zero_exit_is_signing_failure() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "cat > /dev/null\necho 'container not found' >&2\nexit 3");
            let err = sign(&signer(program), b"%PDF").await.unwrap_err();
            match err {
                Xml2PdfError::SigningFailed { detail } => {
                    assert!(detail.contains("container not found"), "got: {detail}")
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn missing_output_is_signing_failure() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "cat > /dev/null\nexit 0");
            let err = sign(&signer(program), b"%PDF").await.unwrap_err();
            assert!(matches!(err, Xml2PdfError::SigningFailed { .. }));
        }

        #[tokio::test]
        async fn slow_signer_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "sleep 5");
            let err = sign(&signer(program).timeout_secs(1), b"%PDF")
                .await
                .unwrap_err();
            assert!(matches!(err, Xml2PdfError::SignerTimeout { secs: 1 }));
        }

        #[tokio::test]
        async fn missing_program_is_signing_failure() {
            let err = sign(&signer(PathBuf::from("/nonexistent/csptest")), b"%PDF")
                .await
                .unwrap_err();
            assert!(matches!(err, Xml2PdfError::SigningFailed { .. }));
        }
    }
}
