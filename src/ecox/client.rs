use super::types::*;
use super::{ApiError, GrowthApi};
use crate::store::Account;
use async_trait::async_trait;
use reqwest::Client;

/// HTTP client for the growth-platform API. Stateless between calls; the
/// per-account bearer token is attached per request.
pub struct EcoxClient {
    client: Client,
    base_url: String,
}

impl EcoxClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn token<'a>(&self, account: &'a Account) -> Result<&'a str, ApiError> {
        account
            .bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::MissingCredential(account.name.clone()))
    }

    async fn get_list(
        &self,
        account: &Account,
        username: Option<&str>,
        offset: u32,
        limit: u32,
        kind: ListKind,
    ) -> Result<ListFollowResponse, ApiError> {
        let token = self.token(account)?;
        let mut url = format!(
            "{}/user/list-follow?offset={}&limit={}&type={}",
            self.base_url,
            offset,
            limit,
            kind.as_str()
        );
        if let Some(name) = username {
            url.push_str(&format!("&username={}", name));
        }

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiMessage>(&body)
                .ok()
                .and_then(|m| m.message)
                .unwrap_or(body);
            return Err(ApiError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        resp.json::<ListFollowResponse>()
            .await
            .map_err(|e| ApiError::Remote {
                status: status.as_u16(),
                detail: format!("unparseable list-follow response: {}", e),
            })
    }

    async fn post_mutation(
        &self,
        account: &Account,
        path: &str,
        uid: Option<&str>,
    ) -> Result<String, ApiError> {
        let token = self.token(account)?;
        let url = format!("{}{}", self.base_url, path);

        let req = self.client.post(&url).bearer_auth(token);
        let req = match uid {
            Some(uid) => req.json(&UidRequest { uid }),
            None => req.json(&serde_json::json!({})),
        };

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&body)
            .ok()
            .and_then(|m| m.message);

        if !status.is_success() {
            return Err(ApiError::Remote {
                status: status.as_u16(),
                detail: message.unwrap_or(body),
            });
        }
        Ok(message.unwrap_or_default())
    }
}

#[async_trait]
impl GrowthApi for EcoxClient {
    async fn follower_count(&self, account: &Account) -> Result<u64, ApiError> {
        let resp = self
            .get_list(account, None, 1, 1, ListKind::Follower)
            .await?;
        resp.total.ok_or(ApiError::Remote {
            status: 200,
            detail: "'total' field missing from list-follow response".to_string(),
        })
    }

    async fn list_follow(
        &self,
        account: &Account,
        username: Option<&str>,
        offset: u32,
        limit: u32,
        kind: ListKind,
    ) -> Result<FollowPage, ApiError> {
        let resp = self
            .get_list(account, username, offset, limit, kind)
            .await?;
        Ok(FollowPage {
            entries: resp.data,
            total: resp.total.unwrap_or(0),
        })
    }

    async fn follow(&self, account: &Account, uid: &str) -> Result<(), ApiError> {
        self.post_mutation(account, "/user/follow", Some(uid))
            .await
            .map(|_| ())
    }

    async fn unfollow(&self, account: &Account, uid: &str) -> Result<(), ApiError> {
        self.post_mutation(account, "/user/unfollow", Some(uid))
            .await
            .map(|_| ())
    }

    async fn claim_daily(&self, account: &Account) -> Result<String, ApiError> {
        let message = self.post_mutation(account, "/green/claim", None).await?;
        if message.is_empty() {
            Ok("Claim successful.".to_string())
        } else {
            Ok(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(token: Option<&str>) -> Account {
        Account {
            id: "a1".to_string(),
            name: "tester".to_string(),
            bearer_token: token.map(str::to_string),
            ..Account::new("a1", "tester")
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_credential_error() {
        let client = EcoxClient::new("http://127.0.0.1:1");
        let err = client.follower_count(&account(None)).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingCredential(_)));

        let err = client
            .follower_count(&account(Some("")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingCredential(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = EcoxClient::new("https://api.example.net/api/v1/");
        assert_eq!(client.base_url, "https://api.example.net/api/v1");
    }
}
