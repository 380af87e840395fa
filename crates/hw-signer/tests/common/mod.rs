//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hw_signer::{ContinuationToken, SignerError, SigningSession, SigningSessionApi};

/// Upper bound on any single wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The reference helper built alongside these tests.
pub fn helper_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_soft-signer-helper"))
}

/// Write an executable `/bin/sh` script.
#[cfg(unix)]
pub fn script(body: &str) -> tempfile::TempPath {
    use std::os::unix::fs::PermissionsExt;

    let mut file = tempfile::Builder::new()
        .prefix("scripted-helper-")
        .suffix(".sh")
        .tempfile()
        .expect("create script");
    writeln!(file, "#!/bin/sh\n{}", body).expect("write script");
    let path = file.into_temp_path();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Open a remote session, retrying while a freshly written script is
/// still reported busy by a concurrently forked test process.
pub async fn open_remote(program: &Path, token: ContinuationToken) -> SigningSession {
    for _ in 0..20 {
        let session = SigningSession::remote(program);
        match session.open(token.clone()).await {
            Ok(()) => return session,
            Err(SignerError::HelperSpawn { reason, .. }) if reason.contains("busy") => {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            Err(err) => panic!("open failed: {}", err),
        }
    }
    panic!("helper executable stayed busy");
}

/// Run `future` under [`TEST_TIMEOUT`].
pub async fn bounded<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation blocked past the test timeout")
}
