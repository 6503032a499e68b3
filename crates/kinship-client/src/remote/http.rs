use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kinship_shared::{FollowQuery, Identity, ProfileId, RemoteError};

use super::{AccessToken, GraphApi, ProfileSource};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DoesFollowRequest<'a> {
    follow_infos: &'a [FollowQuery],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DoesFollowResponse {
    does_follow: Vec<FollowStatus>,
}

#[derive(Debug, Deserialize)]
struct FollowStatus {
    follows: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationRequest<'a> {
    viewer_id: &'a ProfileId,
    target_id: &'a ProfileId,
}

#[derive(Debug, Deserialize)]
struct ProfilesResponse {
    profiles: Vec<Identity>,
}

/// JSON-over-HTTP client for the social-graph API.
#[derive(Debug, Clone)]
pub struct HttpGraphApi {
    client: reqwest::Client,
    base_url: String,
    access_token: AccessToken,
}

impl HttpGraphApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: AccessToken::default(),
        }
    }

    /// Read the bearer token from `token` on every request.
    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token.get() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(RemoteError::Rejected(format!("server answered {}", resp.status())));
        }
        Ok(resp)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let resp = self.send(self.client.post(self.url(path)).json(body)).await?;
        resp.json::<R>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn post_mutation(
        &self,
        path: &str,
        viewer: &ProfileId,
        target: &ProfileId,
    ) -> Result<(), RemoteError> {
        let body = MutationRequest {
            viewer_id: viewer,
            target_id: target,
        };
        self.send(self.client.post(self.url(path)).json(&body)).await?;
        debug!(%viewer, %target, path, "Relationship mutation accepted");
        Ok(())
    }
}

#[async_trait]
impl GraphApi for HttpGraphApi {
    async fn does_follow(&self, queries: &[FollowQuery]) -> Result<Vec<bool>, RemoteError> {
        let body = DoesFollowRequest {
            follow_infos: queries,
        };
        let resp: DoesFollowResponse = self
            .post_json("relationships/does-follow", &body)
            .await?;
        Ok(resp.does_follow.into_iter().map(|s| s.follows).collect())
    }

    async fn follow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError> {
        self.post_mutation("relationships/follow", viewer, target)
            .await
    }

    async fn unfollow(&self, viewer: &ProfileId, target: &ProfileId) -> Result<(), RemoteError> {
        self.post_mutation("relationships/unfollow", viewer, target)
            .await
    }
}

#[async_trait]
impl ProfileSource for HttpGraphApi {
    async fn profiles_owned_by(&self, address: &str) -> Result<Vec<Identity>, RemoteError> {
        let req = self
            .client
            .get(self.url("profiles"))
            .query(&[("ownedBy", address)]);
        let resp = self.send(req).await?;
        let body: ProfilesResponse = resp
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.profiles)
    }
}
