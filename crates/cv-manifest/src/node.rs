//! Manifest node parsing
//!
//! The manifest is embedded in the page as JSON and may be read before the
//! node is complete, so parse failures are retried under a bounded policy.

use cv_net::RetryPolicy;

use crate::verifier::ManifestPayload;
use crate::ManifestFailure;

#[derive(Debug, thiserror::Error)]
enum NodeError {
    #[error("manifest node not present")]
    Missing,

    #[error("manifest node is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read and parse the manifest node for `host`.
///
/// `read` returns the node's current text, or `None` while it is absent.
pub async fn parse_manifest_node<F>(
    mut read: F,
    host: &str,
    retry: &RetryPolicy,
) -> Result<ManifestPayload, ManifestFailure>
where
    F: FnMut() -> Option<String>,
{
    let parsed = retry
        .run(|_| {
            let text = read();
            async move {
                let text = text.ok_or(NodeError::Missing)?;
                Ok::<_, NodeError>(serde_json::from_str::<ManifestPayload>(&text)?)
            }
        })
        .await;

    match parsed {
        Ok(mut payload) => {
            payload.host = host.to_string();
            Ok(payload)
        }
        Err(_) => Err(ManifestFailure::ManifestUnparsable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: &str = r#"{"rootHash":"ab","leaves":["ab"],"version":"42"}"#;

    #[test]
    fn test_parse_after_partial_reads() {
        let mut reads = vec![Some(NODE.to_string()), Some(NODE[..10].to_string()), None];
        let payload = smol::block_on(parse_manifest_node(
            || reads.pop().flatten(),
            "www.instagram.com",
            &RetryPolicy::immediate(3),
        ))
        .unwrap();
        assert_eq!(payload.version, "42");
        assert_eq!(payload.host, "www.instagram.com");
    }

    #[test]
    fn test_exhausted_retries() {
        let result = smol::block_on(parse_manifest_node(
            || Some("{".to_string()),
            "www.instagram.com",
            &RetryPolicy::immediate(2),
        ));
        assert_eq!(result, Err(ManifestFailure::ManifestUnparsable));
    }
}
