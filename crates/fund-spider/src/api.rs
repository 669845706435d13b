use crate::error::FetchError;
use crate::http::*;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{error, trace};

/// Build the default http client; REST sources (and the SEC) want a descriptive
/// `USER_AGENT`, read from the environment.
pub fn build_client() -> Result<HttpClient, FetchError> {
    let user_agent = var("USER_AGENT").unwrap_or_else(|_| "fund-spider".to_string());
    let client = reqwest::ClientBuilder::new()
        .user_agent(user_agent)
        .build()
        .map_err(|err| {
            error!("failed to build http client, error({err})");
            err
        })?;
    Ok(client)
}

/// Map a response status onto the fetch error taxonomy.
///
/// `429 Too Many Requests` is the source's rate-limit signal and `503 Service Unavailable`
/// its throttling signal; both are transient. Any other non-success status is not.
pub fn check_status(status: StatusCode, url: &str) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Err(FetchError::RateLimited(format!("{status} from {url}")))
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        Err(FetchError::Throttled(format!("{status} from {url}")))
    } else {
        Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

/// GET `url` and deserialize the JSON body.
pub async fn get_json<T: DeserializeOwned>(client: &HttpClient, url: &str) -> Result<T, FetchError> {
    trace!("GET {url}");
    let response = client.get(url).send().await?;
    check_status(response.status(), url)?;

    let body = response.bytes().await?;
    let data = serde_json::from_slice(&body).map_err(|err| {
        error!("failed to deserialize response from {url}, error({err})");
        err
    })?;
    Ok(data)
}
