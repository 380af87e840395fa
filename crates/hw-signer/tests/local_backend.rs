//! Sessions over the local backend, with software devices standing in
//! for hardware at temporary access paths.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use hw_signer::{
    config::DeviceConfig, BackendKind, BackendSelection, ContinuationToken, SessionState,
    SignerConfig, SignerError, SigningSession, SigningSessionApi, SoftwareConnector,
};

use common::bounded;

fn device_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let device = dir.path().join("tpmrm0");
    std::fs::write(&device, b"").unwrap();
    (dir, device)
}

#[tokio::test]
async fn test_local_sign_and_verify() {
    let (dir, device) = device_dir();
    let candidates = vec![dir.path().join("missing"), device];
    let session = SigningSession::local(candidates, Arc::new(SoftwareConnector));
    assert_eq!(session.backend_kind(), BackendKind::Local);

    session.open(ContinuationToken::empty()).await.unwrap();
    let public_key = bounded(session.public_key()).await.unwrap();
    assert_eq!(public_key.to_der().unwrap().len(), 91);

    let hello = bounded(session.sign(b"hello")).await.unwrap();
    let yes = bounded(session.sign(b"yes")).await.unwrap();
    assert!(public_key.verify(&hello.signature, b"hello").unwrap());
    assert!(public_key.verify(&yes.signature, b"yes").unwrap());
    assert_eq!(hello.token, yes.token);
    assert!(hello.token.is_empty());

    session.close().await;
    assert_eq!(bounded(session.sign(b"hello")).await, Err(SignerError::Closed));
}

#[tokio::test]
async fn test_local_ignores_token() {
    let (_dir, device) = device_dir();
    let session = SigningSession::local(vec![device], Arc::new(SoftwareConnector));

    session
        .open(ContinuationToken::new("cHJldmlvdXMgcnVu"))
        .await
        .unwrap();
    let outcome = bounded(session.sign(b"hello")).await.unwrap();
    assert!(outcome.token.is_empty());
    session.close().await;
}

#[tokio::test]
async fn test_local_device_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let session = SigningSession::local(
        vec![dir.path().join("tpmrm0"), dir.path().join("tpm0")],
        Arc::new(SoftwareConnector),
    );

    match session.open(ContinuationToken::empty()).await {
        Err(SignerError::DeviceNotFound { tried }) => assert_eq!(tried.len(), 2),
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
    session.close().await;
}

#[tokio::test]
async fn test_local_from_config() {
    let (_dir, device) = device_dir();
    let config = SignerConfig {
        backend: BackendSelection::Local,
        device: DeviceConfig {
            candidate_paths: vec![device],
        },
        ..SignerConfig::default()
    };

    let session = SigningSession::from_config(&config, Arc::new(SoftwareConnector)).unwrap();
    session.open(ContinuationToken::empty()).await.unwrap();
    let public_key = bounded(session.public_key()).await.unwrap();
    let outcome = bounded(session.sign(b"configured")).await.unwrap();
    assert!(public_key.verify(&outcome.signature, b"configured").unwrap());
    session.close().await;
}

#[test]
fn test_local_config_requires_paths() {
    let config = SignerConfig {
        backend: BackendSelection::Local,
        device: DeviceConfig {
            candidate_paths: Vec::new(),
        },
        ..SignerConfig::default()
    };
    assert!(SigningSession::from_config(&config, Arc::new(SoftwareConnector)).is_err());
}
