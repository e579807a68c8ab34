use crate::errors::{FetchError, FetchResult};
use crate::fetch_service::{Endpoint, FetchService};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    Rejected(String),
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SubscribeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

/// Newsletter sign-up against the subscription backend.
#[derive(Clone, Debug)]
pub struct SubscriptionService {
    fetch: FetchService,
    endpoint: String,
}

impl SubscriptionService {
    pub fn new(fetch: FetchService, endpoint: impl Into<String>) -> Self {
        Self {
            fetch,
            endpoint: endpoint.into(),
        }
    }

    pub async fn subscribe_email(&self, email: &str) -> FetchResult<SubscribeOutcome> {
        let email = email.trim();
        if !looks_like_email(email) {
            return Err(FetchError::precondition(format!(
                "invalid email address {:?}",
                email
            )));
        }

        let endpoint = Endpoint::parse(&self.endpoint)?;
        let response: SubscribeResponse = self
            .fetch
            .post_json(&endpoint, &SubscribeRequest { email })
            .await?;

        let outcome = if response.success {
            SubscribeOutcome::Subscribed
        } else if response.message.to_lowercase().contains("already") {
            SubscribeOutcome::AlreadySubscribed
        } else {
            SubscribeOutcome::Rejected(response.message)
        };
        info!("Subscription request finished: {:?}", outcome);
        Ok(outcome)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
