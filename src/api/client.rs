use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::api::models::{
    Conversation, ConversationId, Message, Page, Product, ProductFilter, ProductId, Profile,
    Registration,
};
use crate::error::{Error, Result};

/// REST calls the messenger panel depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>>;
    async fn conversation_messages(&self, token: &str, conversation_id: ConversationId) -> Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(),
            base_url: Self::base(base_url)?,
        })
    }

    fn base(base_url: &str) -> Result<Url> {
        let normalized = crate::utils::normalize_url(base_url);
        if normalized.is_empty() {
            return Err(Error::Config("server url is not set".into()));
        }
        let with_slash = if normalized.ends_with('/') { normalized } else { format!("{normalized}/") };
        Ok(Url::parse(&with_slash)?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// WebSocket address of the chat hub, with the token passed the way the hub expects it
    /// when negotiation is skipped.
    pub fn hub_url(&self, token: &str) -> Result<Url> {
        let mut url = self.endpoint("chatHub")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(Error::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidUrl(format!("cannot use {scheme} for {url}")))?;
        url.query_pairs_mut().append_pair("access_token", token);
        Ok(url)
    }

    async fn check(resp: Response) -> Result<Response> {
        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
            s if !s.is_success() => Err(Error::Http(s)),
            _ => Ok(resp),
        }
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let resp = self.http.post(self.endpoint(path)?).json(body).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint("api/auth/login")?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !resp.status().is_success() {
            log::info!("login rejected: HTTP {}", resp.status());
            return Err(Error::Rejected("invalid email or password".into()));
        }
        let json: Value = resp.json().await?;
        token_from(&json).ok_or_else(|| Error::Rejected("no token in login response".into()))
    }

    pub async fn register(&self, form: &Registration) -> Result<String> {
        let mut multipart = reqwest::multipart::Form::new()
            .text("FirstName", form.first_name.clone())
            .text("LastName", form.last_name.clone())
            .text("Email", form.email.clone())
            .text("Password", form.password.clone())
            .text("Role", "Author");
        if let Some(bytes) = &form.avatar {
            let part = reqwest::multipart::Part::bytes(bytes.clone())
                .file_name("avatar.png")
                .mime_str("image/png")?;
            multipart = multipart.part("Avatar", part);
        }

        let resp = self
            .http
            .post(self.endpoint("api/auth/register")?)
            .multipart(multipart)
            .send()
            .await?;
        let status = resp.status();
        let json: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(Error::Rejected(
                rejection_message(&json).unwrap_or_else(|| "registration failed".into()),
            ));
        }
        token_from(&json).ok_or_else(|| Error::Rejected("no token in registration response".into()))
    }

    pub async fn profile(&self, token: &str) -> Result<Profile> {
        self.post_json("api/user/profile", &json!({ "token": token })).await
    }

    pub async fn conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        self.post_json("api/chat/conversations/list", &json!({ "token": token })).await
    }

    pub async fn messages(&self, token: &str, conversation_id: ConversationId) -> Result<Vec<Message>> {
        self.post_json(
            "api/chat/conversations/messages",
            &json!({ "conversationId": conversation_id, "token": token }),
        )
        .await
    }

    /// Open (or find) the conversation with `participant_id` and return its id.
    pub async fn start_conversation(&self, token: &str, participant_id: &str) -> Result<ConversationId> {
        let json: Value = self
            .post_json(
                "api/chat/conversations",
                &json!({ "Token": token, "ParticipantId": participant_id }),
            )
            .await?;
        json.get("conversationId")
            .or_else(|| json.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Protocol("no conversation id in response".into()))
    }

    pub async fn products(&self, filter: &ProductFilter, token: Option<&str>) -> Result<Page<Product>> {
        let mut url = self.endpoint("api/Products/filtered")?;
        url.query_pairs_mut().extend_pairs(filter.query_pairs());
        let mut req = self.http.post(url).json(&json!({ "Token": token }));
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        let resp = Self::check(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    pub async fn top_liked(&self) -> Result<Vec<Product>> {
        let resp = self.http.get(self.endpoint("api/Products/top-liked")?).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Flip the like state of a product for the signed-in user.
    pub async fn toggle_like(&self, token: &str, product_id: ProductId) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint(&format!("api/ProductInteractions/like/{product_id}"))?)
            .bearer_auth(token)
            .json(&json!({ "Token": token }))
            .send()
            .await?;
        Self::check(resp).await.map(|_| ())
    }

    pub async fn record_view(&self, token: Option<&str>, product_id: ProductId) -> Result<()> {
        let mut req = self
            .http
            .post(self.endpoint(&format!("api/ProductInteractions/view/{product_id}"))?);
        if let Some(t) = token {
            req = req.json(&json!({ "Token": t }));
        }
        Self::check(req.send().await?).await.map(|_| ())
    }

    pub async fn liked_products(&self, token: &str, page: u32, page_size: u32) -> Result<Page<Product>> {
        self.interaction_page("user-liked-products", token, page, page_size).await
    }

    pub async fn viewed_products(&self, token: &str, page: u32, page_size: u32) -> Result<Page<Product>> {
        self.interaction_page("user-viewed-products", token, page, page_size).await
    }

    async fn interaction_page(&self, kind: &str, token: &str, page: u32, page_size: u32) -> Result<Page<Product>> {
        let mut url = self.endpoint(&format!("api/ProductInteractions/{kind}"))?;
        url.query_pairs_mut()
            .append_pair("page", &page.max(1).to_string())
            .append_pair("pageSize", &page_size.max(1).to_string());
        let resp = self.http.post(url).json(&json!({ "Token": token })).send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        self.conversations(token).await
    }

    async fn conversation_messages(&self, token: &str, conversation_id: ConversationId) -> Result<Vec<Message>> {
        self.messages(token, conversation_id).await
    }
}

fn token_from(json: &Value) -> Option<String> {
    json.get("token")
        .or_else(|| json.get("accessToken"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Flatten `{errors: {field: [..]}, message: "a,b"}` into one readable line.
fn rejection_message(json: &Value) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(errors) = json.get("errors").and_then(Value::as_object) {
        for list in errors.values() {
            match list {
                Value::Array(items) => parts.extend(items.iter().filter_map(Value::as_str).map(str::to_string)),
                Value::String(s) => parts.push(s.clone()),
                _ => {}
            }
        }
    }
    if let Some(message) = json.get("message").and_then(Value::as_str) {
        parts.extend(message.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string));
    }
    if parts.is_empty() { None } else { Some(parts.join("; ")) }
}
