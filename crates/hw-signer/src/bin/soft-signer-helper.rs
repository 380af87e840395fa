//! # Software Signing Helper
//!
//! Reference helper executable for the remote backend. Speaks the line
//! protocol on stdin/stdout with an in-memory P-256 key:
//!
//! ```text
//! → {"key_data": ""}                 ← {"key_data": "<token>", "public_key": "<spki>"}
//! → {"sign_data": "<base64 msg>"}    ← {"key_data": "<token>", "signature": "<der>"}
//! ```
//!
//! Logs go to stderr. Exits 0 when stdin closes, 1 on any error.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use hw_signer::adapters::protocol;
use hw_signer::{ContinuationToken, HelperRequest, HelperResponse, SoftwareKey};
use signer_telemetry::{init_telemetry, log_event, TelemetryConfig};

const COMPONENT: &str = "soft-signer-helper";

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_binary(COMPONENT))
        .context("Failed to initialise logging")?;

    if let Err(err) = serve().await {
        log_event!(error, COMPONENT, "Helper stopped", error = %err);
        return Err(err);
    }
    Ok(())
}

async fn serve() -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut key: Option<SoftwareKey> = None;

    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }

        let request = protocol::decode_request(&line).context("Invalid request frame")?;
        let response = handle(request, &mut key)?;

        let frame = protocol::encode_frame(&response).context("Failed to encode response")?;
        stdout.write_all(&frame).await.context("Failed to write response")?;
        stdout.flush().await.context("Failed to flush response")?;
    }

    log_event!(info, COMPONENT, "Input closed, exiting");
    Ok(())
}

fn handle(request: HelperRequest, key: &mut Option<SoftwareKey>) -> Result<HelperResponse> {
    match request {
        HelperRequest::Key { key_data } => {
            if key.is_some() {
                bail!("key requested twice");
            }
            let token = ContinuationToken::new(key_data);
            let loaded = SoftwareKey::load_or_generate(&token)?;
            log_event!(info, COMPONENT, "Key ready", resumed = !token.is_empty());

            let response = HelperResponse {
                key_data: Some(loaded.token().into_inner()),
                public_key: Some(loaded.public_key_record()?.into_inner()),
                signature: None,
            };
            *key = Some(loaded);
            Ok(response)
        }
        HelperRequest::Sign { sign_data } => {
            let loaded = key
                .as_ref()
                .ok_or_else(|| anyhow!("sign requested before key"))?;
            let message = STANDARD
                .decode(sign_data.as_bytes())
                .context("sign_data is not valid base64")?;
            let signature = loaded.sign(&message)?;
            log_event!(debug, COMPONENT, "Signed message", message_len = message.len());

            Ok(HelperResponse {
                key_data: Some(loaded.token().into_inner()),
                public_key: None,
                signature: Some(signature.into_inner()),
            })
        }
    }
}
