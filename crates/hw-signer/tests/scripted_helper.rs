//! Remote sessions against scripted helpers that misbehave on purpose.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use hw_signer::{
    ContinuationToken, ProtocolError, PublicKeyRecord, SessionState, SignerError, SigningSession,
    SigningSessionApi,
};

use common::{bounded, open_remote, script};

#[tokio::test]
async fn test_missing_helper_fails_open() {
    let session = SigningSession::remote("/nonexistent/TpmAuth");
    let result = session.open(ContinuationToken::empty()).await;

    assert!(matches!(result, Err(SignerError::HelperSpawn { .. })));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        bounded(session.sign(b"hello")).await,
        Err(SignerError::Failed(_))
    ));
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_exit_failure_carries_diagnostics() {
    let helper = script("read _request\necho 'tpm: no device available' >&2\nexit 4");
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    match bounded(session.public_key()).await {
        Err(SignerError::HelperExited {
            status,
            diagnostics,
        }) => {
            assert!(status.contains('4'), "status {}", status);
            assert!(diagnostics.contains("tpm: no device available"));
        }
        other => panic!("unexpected result {:?}", other),
    }

    assert_eq!(session.state(), SessionState::Failed);
    match bounded(session.sign(b"hello")).await {
        Err(SignerError::Failed(cause)) => {
            assert!(matches!(*cause, SignerError::HelperExited { .. }))
        }
        other => panic!("unexpected result {:?}", other),
    }
    session.close().await;
}

#[tokio::test]
async fn test_malformed_frame_is_protocol_error() {
    let helper = script("read _request\necho 'this is not json'\nsleep 30");
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    assert!(matches!(
        bounded(session.public_key()).await,
        Err(SignerError::Protocol(ProtocolError::Malformed(_)))
    ));
    assert_eq!(session.state(), SessionState::Failed);
    bounded(session.close()).await;
}

#[tokio::test]
async fn test_non_object_frame_is_protocol_error() {
    let helper = script("read _request\necho '[1, 2, 3]'\nsleep 30");
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    assert_eq!(
        bounded(session.public_key()).await,
        Err(SignerError::Protocol(ProtocolError::NotAnObject))
    );
    bounded(session.close()).await;
}

#[tokio::test]
async fn test_signature_only_frame_keeps_public_key() {
    let helper = script(concat!(
        "read _request\n",
        "echo '{\"key_data\":\"dG9rZW4=\",\"public_key\":\"cHVibGlj\"}'\n",
        "read _request\n",
        "echo '{\"signature\":\"c2lnbmF0dXJl\"}'\n",
        "read _request\n",
        "echo '{\"key_data\":\"\",\"signature\":\"c2Vjb25k\"}'\n",
        "read _request\n",
    ));
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    assert_eq!(
        bounded(session.public_key()).await,
        Ok(PublicKeyRecord::new("cHVibGlj"))
    );

    let first = bounded(session.sign(b"hello")).await.unwrap();
    assert_eq!(first.token, ContinuationToken::new("dG9rZW4="));
    assert_eq!(first.signature.as_str(), "c2lnbmF0dXJl");

    let second = bounded(session.sign(b"yes")).await.unwrap();
    assert_eq!(second.token, first.token);
    assert_eq!(second.signature.as_str(), "c2Vjb25k");

    assert_eq!(
        bounded(session.public_key()).await,
        Ok(PublicKeyRecord::new("cHVibGlj"))
    );
    session.close().await;
}

#[tokio::test]
async fn test_response_without_signature() {
    let helper = script(concat!(
        "read _request\n",
        "echo '{\"key_data\":\"dG9rZW4=\",\"public_key\":\"cHVibGlj\"}'\n",
        "read _request\n",
        "echo '{\"key_data\":\"dG9rZW4=\"}'\n",
        "read _request\n",
    ));
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    assert_eq!(
        bounded(session.sign(b"hello")).await,
        Err(SignerError::MissingField("signature"))
    );
    assert_eq!(session.state(), SessionState::Failed);
    session.close().await;
}

#[tokio::test]
async fn test_helper_closing_stream_before_reply() {
    let helper = script(concat!(
        "read _request\n",
        "echo '{\"key_data\":\"dG9rZW4=\",\"public_key\":\"cHVibGlj\"}'\n",
        "read _request\n",
        "exit 0\n",
    ));
    let session = open_remote(&helper, ContinuationToken::empty()).await;

    bounded(session.public_key()).await.unwrap();
    assert_eq!(
        bounded(session.sign(b"hello")).await,
        Err(SignerError::HelperClosedStream)
    );
    session.close().await;
}

#[tokio::test]
async fn test_token_change_is_rejected() {
    let helper = script(concat!(
        "read _request\n",
        "echo '{\"key_data\":\"Zmlyc3Q=\",\"public_key\":\"cHVibGlj\"}'\n",
        "read _request\n",
        "echo '{\"key_data\":\"b3RoZXI=\",\"signature\":\"c2lnbmF0dXJl\"}'\n",
        "read _request\n",
    ));
    let session = open_remote(&helper, ContinuationToken::new("Zmlyc3Q=")).await;

    assert_eq!(
        bounded(session.sign(b"hello")).await,
        Err(SignerError::TokenMismatch)
    );
    session.close().await;
}

#[tokio::test]
async fn test_close_releases_blocked_callers() {
    let helper = script("read _request\nsleep 30");
    let session = Arc::new(open_remote(&helper, ContinuationToken::empty()).await);

    let public_key = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.public_key().await })
    };
    let sign = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.sign(b"hello").await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    bounded(session.close()).await;

    assert_eq!(bounded(public_key).await.unwrap(), Err(SignerError::Closed));
    assert_eq!(bounded(sign).await.unwrap(), Err(SignerError::Closed));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_close_releases_sign_blocked_on_write() {
    let helper = script(concat!(
        "read _request\n",
        "echo '{\"key_data\":\"dG9rZW4=\",\"public_key\":\"cHVibGlj\"}'\n",
        "sleep 30\n",
    ));
    let session = Arc::new(open_remote(&helper, ContinuationToken::empty()).await);
    bounded(session.public_key()).await.unwrap();

    // The request outgrows the pipe buffer and the helper never reads it.
    let sign = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.sign(&vec![0u8; 4 << 20]).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!sign.is_finished());
    bounded(session.close()).await;

    assert_eq!(bounded(sign).await.unwrap(), Err(SignerError::Closed));
    assert_eq!(session.state(), SessionState::Closed);
}
