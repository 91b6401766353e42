//! Token and account lookups
//!
//! These calls run before a profile is fully configured (exchanging a
//! short-lived token, finding the Instagram user behind a Page), so they hang
//! off `GraphClient` directly instead of `MediaApi`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{GraphClient, JsonObject, Params};
use crate::error::{MissingFieldError, Result, TransportError};

/// Result of the `debug_token` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    #[serde(default)]
    pub app_id: String,
    #[serde(default, rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub data_access_expires_at: i64,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub user_id: String,
}

/// A Facebook Page owned by a business, with its linked Instagram account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPage {
    pub id: String,
    pub name: String,
    /// Empty when no Instagram business account is linked
    pub ig_user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct OwnedPagesResponse {
    #[serde(default)]
    data: Vec<PageEntry>,
    #[serde(default)]
    paging: Paging,
}

#[derive(Debug, Default, Deserialize)]
struct PageEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    instagram_business_account: Option<AccountRef>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountRef {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

impl GraphClient {
    /// Exchange a short-lived user token for a long-lived one
    pub async fn exchange_token(
        &self,
        app_id: &str,
        app_secret: &str,
        short_token: &str,
    ) -> Result<String> {
        let mut params = Params::new();
        params.insert("grant_type".to_string(), "fb_exchange_token".to_string());
        params.insert("client_id".to_string(), app_id.to_string());
        params.insert("client_secret".to_string(), app_secret.to_string());
        params.insert("fb_exchange_token".to_string(), short_token.to_string());

        let response = self.get("oauth/access_token", params).await?;

        match response.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(MissingFieldError::MissingAccessToken.into()),
        }
    }

    /// Inspect a token: validity, expiry, scopes
    pub async fn debug_token(&self, input_token: &str) -> Result<TokenInfo> {
        let mut params = Params::new();
        params.insert("input_token".to_string(), input_token.to_string());

        let response = self.get("debug_token", params).await?;

        match response.get("data") {
            Some(data @ Value::Object(_)) => serde_json::from_value(data.clone())
                .map_err(|e| TransportError::Parse(format!("token data: {}", e)).into()),
            _ => Err(MissingFieldError::MissingTokenData.into()),
        }
    }

    /// Resolve the Instagram business account linked to a Facebook Page
    pub async fn fetch_ig_user_id(&self, page_id: &str) -> Result<String> {
        let mut params = Params::new();
        params.insert("fields".to_string(), "instagram_business_account".to_string());

        let response = self.get(page_id, params).await?;

        let account = match response.get("instagram_business_account") {
            Some(Value::Object(account)) => account,
            _ => return Err(MissingFieldError::MissingInstagramAccount.into()),
        };

        match account.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(MissingFieldError::MissingInstagramAccountId.into()),
        }
    }

    /// List every Page owned by a business, following `paging.next`
    pub async fn fetch_owned_pages(&self, business_id: &str) -> Result<Vec<OwnedPage>> {
        let mut params = Params::new();
        params.insert(
            "fields".to_string(),
            "id,name,instagram_business_account".to_string(),
        );

        let response = self
            .get(&format!("{}/owned_pages", business_id), params)
            .await?;
        let (mut pages, mut next) = parse_owned_pages(response)?;

        while let Some(url) = next {
            let response = self.get_url(&url).await?;
            let (batch, following) = parse_owned_pages(response)?;
            pages.extend(batch);
            next = following;
        }

        Ok(pages)
    }
}

fn parse_owned_pages(payload: JsonObject) -> Result<(Vec<OwnedPage>, Option<String>)> {
    let parsed: OwnedPagesResponse = serde_json::from_value(Value::Object(payload))
        .map_err(|e| TransportError::Parse(format!("owned pages: {}", e)))?;

    let pages = parsed
        .data
        .into_iter()
        .map(|entry| OwnedPage {
            id: entry.id,
            name: entry.name,
            ig_user_id: entry
                .instagram_business_account
                .map(|account| account.id)
                .unwrap_or_default(),
        })
        .collect();

    let next = parsed.paging.next.filter(|url| !url.is_empty());
    Ok((pages, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_owned_pages_with_and_without_account() {
        let payload = json!({
            "data": [
                {"id": "p1", "name": "First", "instagram_business_account": {"id": "ig1"}},
                {"id": "p2", "name": "Second"}
            ],
            "paging": {"next": "https://graph.example.com/next"}
        });
        let Value::Object(payload) = payload else {
            unreachable!()
        };

        let (pages, next) = parse_owned_pages(payload).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].ig_user_id, "ig1");
        assert_eq!(pages[1].ig_user_id, "");
        assert_eq!(next.as_deref(), Some("https://graph.example.com/next"));
    }

    #[test]
    fn test_parse_owned_pages_last_page() {
        let Value::Object(payload) = json!({"data": [], "paging": {"next": ""}}) else {
            unreachable!()
        };
        let (pages, next) = parse_owned_pages(payload).unwrap();
        assert!(pages.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn test_token_info_tolerates_missing_fields() {
        let info: TokenInfo =
            serde_json::from_value(json!({"app_id": "42", "is_valid": true})).unwrap();
        assert_eq!(info.app_id, "42");
        assert!(info.is_valid);
        assert!(info.scopes.is_empty());
        assert_eq!(info.expires_at, 0);
    }
}
