//! Response helpers shared by the provider clients.

use serde::{Deserialize, Deserializer};

use crate::error::ProviderError;

/// Read an explicit JSON `null` as the type's default, like a missing field.
///
/// Pair with `#[serde(default)]` so absent fields are accepted too.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ensure the response has one of the accepted status codes. Returns the
/// response unchanged on success, or a [`ProviderError::Api`] containing
/// the status and body text on failure.
pub(crate) async fn ensure_status(
    response: reqwest::Response,
    accepted: &[u16],
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !accepted.contains(&status.as_u16()) {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a JSON body after checking the status against `accepted`.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    accepted: &[u16],
) -> Result<T, ProviderError> {
    let response = ensure_status(response, accepted).await?;
    Ok(response.json::<T>().await?)
}

/// Download a file into memory. Only `200 OK` counts as success.
pub(crate) async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, ProviderError> {
    let response = client.get(url).send().await?;
    let response = ensure_status(response, &[200]).await?;
    Ok(response.bytes().await?.to_vec())
}
