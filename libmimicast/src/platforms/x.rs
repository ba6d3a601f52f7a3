//! X platform implementation
//!
//! Talks to the same endpoints the X web client uses: a guest token plus the
//! onboarding task flow for login, cookie-authenticated GraphQL calls for
//! handle lookup, timelines and posting. Every cookie the network sets is
//! captured as a [`CookieRecord`] so the session can be persisted and restored
//! without logging in again.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Credentials;
use crate::error::{MimicastError, PlatformError, Result};
use crate::platforms::{AccountId, PostAck, PostStream, Profile, RawPost, Transport};
use crate::session::{CookieRecord, SameSite, Session};

/// Public bearer token embedded in the X web client
const BEARER_TOKEN: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

const DEFAULT_API_BASE: &str = "https://api.x.com";
const DEFAULT_GRAPHQL_BASE: &str = "https://x.com/i/api/graphql";
const DEFAULT_COOKIE_DOMAIN: &str = ".x.com";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Upper bound on onboarding subtasks before login gives up
const MAX_LOGIN_STEPS: usize = 12;

/// Largest page the timeline endpoint serves
const TIMELINE_PAGE_SIZE: usize = 40;

const USER_BY_SCREEN_NAME: GraphqlOperation = GraphqlOperation {
    query_id: "G3KGOASz96M-Qu0nwmGXNg",
    name: "UserByScreenName",
};

const USER_TWEETS: GraphqlOperation = GraphqlOperation {
    query_id: "V7H0Ap3_Hh2FyS75OCDO3Q",
    name: "UserTweets",
};

const CREATE_TWEET: GraphqlOperation = GraphqlOperation {
    query_id: "a1p9RWpkYKBjWv_I3WzS-A",
    name: "CreateTweet",
};

struct GraphqlOperation {
    query_id: &'static str,
    name: &'static str,
}

fn graphql_features() -> Value {
    json!({
        "hidden_profile_likes_enabled": false,
        "hidden_profile_subscriptions_enabled": false,
        "responsive_web_graphql_exclude_directive_enabled": true,
        "verified_phone_label_enabled": false,
        "subscriptions_verification_info_is_identity_verified_enabled": false,
        "subscriptions_verification_info_verified_since_enabled": true,
        "highlights_tweets_tab_ui_enabled": true,
        "creator_subscriptions_tweet_preview_api_enabled": true,
        "responsive_web_graphql_skip_user_profile_image_extensions_enabled": false,
        "responsive_web_graphql_timeline_navigation_enabled": true,
        "rweb_lists_timeline_redesign_enabled": true,
        "tweetypie_unmention_optimization_enabled": true,
        "responsive_web_edit_tweet_api_enabled": true,
        "graphql_is_translatable_rweb_tweet_is_translatable_enabled": true,
        "view_counts_everywhere_api_enabled": true,
        "longform_notetweets_consumption_enabled": true,
        "longform_notetweets_rich_text_read_enabled": true,
        "longform_notetweets_inline_media_enabled": true,
        "freedom_of_speech_not_reach_fetch_enabled": true,
        "standardized_nudges_misinfo": true,
        "tweet_with_visibility_results_prefer_gql_limited_actions_policy_enabled": true,
        "responsive_web_enhance_cards_enabled": false,
        "c9s_tweet_anatomy_moderator_badge_enabled": true,
        "tweet_awards_web_tipping_enabled": false,
        "communities_web_enable_tweet_community_results_fetch": true,
        "articles_preview_enabled": true,
        "rweb_video_timestamps_enabled": true
    })
}

/// Map an unsuccessful HTTP status to a PlatformError
fn map_status_error(status: StatusCode, body: &str, context: &str) -> PlatformError {
    let body: String = body.chars().take(300).collect();
    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "X rejected the session during {} (HTTP {}): {}. Delete the session file to log in again.",
            context, status, body
        )),
        429 => PlatformError::RateLimit(format!(
            "X rate limit exceeded during {}: {}",
            context, body
        )),
        _ => PlatformError::Network(format!(
            "X request failed during {} (HTTP {}): {}",
            context, status, body
        )),
    }
}

fn network_error(error: reqwest::Error, context: &str) -> PlatformError {
    PlatformError::Network(format!("X request failed during {}: {}", context, error))
}

fn parse_error(error: impl std::fmt::Display, context: &str) -> PlatformError {
    PlatformError::Parse(format!("Unexpected X response during {}: {}", context, error))
}

/// Response of one onboarding task step
#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(default)]
    flow_token: Option<String>,
    #[serde(default)]
    subtasks: Vec<Subtask>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Subtask {
    subtask_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct GuestActivation {
    guest_token: String,
}

#[derive(Debug, Deserialize)]
struct VerifiedCredentials {
    id_str: String,
    screen_name: String,
}

/// What to do for a login subtask
#[derive(Debug, PartialEq)]
enum LoginStep {
    Submit(Value),
    Done,
}

/// Build the input for the next onboarding subtask
fn next_login_input(
    subtask_id: &str,
    flow_token: &str,
    credentials: &Credentials,
) -> Result<LoginStep> {
    let input = match subtask_id {
        "LoginJsInstrumentationSubtask" => json!({
            "subtask_id": subtask_id,
            "js_instrumentation": { "response": "{}", "link": "next_link" }
        }),
        "LoginEnterUserIdentifierSSO" => json!({
            "subtask_id": subtask_id,
            "settings_list": {
                "setting_responses": [{
                    "key": "user_identifier",
                    "response_data": { "text_data": { "result": credentials.username } }
                }],
                "link": "next_link"
            }
        }),
        "LoginEnterPassword" => json!({
            "subtask_id": subtask_id,
            "enter_password": {
                "password": credentials.password.expose_secret(),
                "link": "next_link"
            }
        }),
        "AccountDuplicationCheck" => json!({
            "subtask_id": subtask_id,
            "check_logged_in_account": { "link": "AccountDuplicationCheck_false" }
        }),
        "LoginEnterAlternateIdentifierSubtask" | "LoginAcid" => {
            let email = credentials.email.as_deref().ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "X asked for a verification contact ({}) but account.email is not configured",
                    subtask_id
                ))
            })?;
            json!({
                "subtask_id": subtask_id,
                "enter_text": { "text": email, "link": "next_link" }
            })
        }
        "LoginSuccessSubtask" => return Ok(LoginStep::Done),
        other => {
            return Err(PlatformError::Authentication(format!(
                "X login requires an unsupported step: {}",
                other
            ))
            .into())
        }
    };

    Ok(LoginStep::Submit(json!({
        "flow_token": flow_token,
        "subtask_inputs": [input]
    })))
}

/// One page of a user timeline
#[derive(Debug, Default, PartialEq)]
struct TimelinePage {
    posts: Vec<RawPost>,
    bottom_cursor: Option<String>,
}

/// Extract posts and the bottom cursor from a UserTweets response
fn parse_timeline_page(body: &Value) -> TimelinePage {
    let result = &body["data"]["user"]["result"];
    let timeline = if result["timeline_v2"].is_object() {
        &result["timeline_v2"]["timeline"]
    } else {
        &result["timeline"]["timeline"]
    };

    let mut page = TimelinePage::default();
    let instructions = timeline["instructions"].as_array().cloned().unwrap_or_default();

    for instruction in &instructions {
        let entries = match instruction["type"].as_str() {
            Some("TimelineAddEntries") => {
                instruction["entries"].as_array().cloned().unwrap_or_default()
            }
            Some("TimelinePinEntry") => vec![instruction["entry"].clone()],
            _ => continue,
        };

        for entry in &entries {
            let content = &entry["content"];
            match content["entryType"].as_str() {
                Some("TimelineTimelineItem") => {
                    let result = &content["itemContent"]["tweet_results"]["result"];
                    if let Some(post) = parse_tweet_result(result) {
                        page.posts.push(post);
                    }
                }
                Some("TimelineTimelineModule") => {
                    for item in content["items"].as_array().into_iter().flatten() {
                        let result = &item["item"]["itemContent"]["tweet_results"]["result"];
                        if let Some(post) = parse_tweet_result(result) {
                            page.posts.push(post);
                        }
                    }
                }
                Some("TimelineTimelineCursor") if content["cursorType"] == "Bottom" => {
                    page.bottom_cursor = content["value"].as_str().map(str::to_string);
                }
                _ => {}
            }
        }
    }

    page
}

fn parse_tweet_result(result: &Value) -> Option<RawPost> {
    // Posts with visibility limits wrap the tweet one level deeper.
    let tweet = if result["__typename"] == "TweetWithVisibilityResults" {
        &result["tweet"]
    } else {
        result
    };

    let legacy = &tweet["legacy"];
    let id = tweet["rest_id"]
        .as_str()
        .or_else(|| legacy["id_str"].as_str())?
        .to_string();

    let text = tweet["note_tweet"]["note_tweet_results"]["result"]["text"]
        .as_str()
        .or_else(|| legacy["full_text"].as_str())
        .map(str::to_string);

    Some(RawPost { id, text })
}

fn cookie_record(cookie: &reqwest::cookie::Cookie<'_>, fallback_domain: &str) -> CookieRecord {
    let same_site = if cookie.same_site_strict() {
        SameSite::Strict
    } else if cookie.same_site_lax() {
        SameSite::Lax
    } else {
        SameSite::None
    };

    let mut record = CookieRecord::new(
        cookie.name(),
        cookie.value(),
        cookie.domain().unwrap_or(fallback_domain),
    );
    record.path = cookie.path().unwrap_or("/").to_string();
    record.secure = cookie.secure();
    record.http_only = cookie.http_only();
    record.same_site = same_site;
    record.set_host_only(cookie.domain().is_none());
    if let Some(expires) = cookie.expires() {
        record.set_expires(chrono::DateTime::<chrono::Utc>::from(expires).to_rfc3339());
    }
    record
}

/// X web client
pub struct XClient {
    http: reqwest::Client,
    session: Session,
    api_base: String,
    graphql_base: String,
    cookie_domain: String,
}

impl XClient {
    /// Create a client against the public X endpoints
    pub fn new() -> Result<Self> {
        Self::with_base_urls(DEFAULT_API_BASE, DEFAULT_GRAPHQL_BASE)
    }

    /// Create a client against custom endpoints (proxies, test servers)
    pub fn with_base_urls(api_base: &str, graphql_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| network_error(e, "client setup"))?;

        Ok(Self {
            http,
            session: Session::default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            graphql_base: graphql_base.trim_end_matches('/').to_string(),
            cookie_domain: DEFAULT_COOKIE_DOMAIN.to_string(),
        })
    }

    fn capture_cookies(&mut self, response: &Response) {
        for cookie in response.cookies() {
            self.session.upsert(cookie_record(&cookie, &self.cookie_domain));
        }
    }

    /// Headers shared by every request
    fn base_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(AUTHORIZATION, format!("Bearer {}", BEARER_TOKEN))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header("x-twitter-active-user", "yes")
            .header("x-twitter-client-language", "en");

        if self.session.is_empty() {
            builder
        } else {
            builder.header(COOKIE, self.session.cookie_header())
        }
    }

    /// Headers for requests made on behalf of the logged-in account
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        self.base_headers(builder)
            .header("x-csrf-token", self.session.get("ct0").unwrap_or_default())
            .header("x-twitter-auth-type", "OAuth2Session")
    }

    async fn guest_token(&mut self) -> Result<String> {
        let url = format!("{}/1.1/guest/activate.json", self.api_base);
        let response = self
            .base_headers(self.http.post(&url))
            .send()
            .await
            .map_err(|e| network_error(e, "guest activation"))?;

        self.capture_cookies(&response);
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body, "guest activation").into());
        }

        let activation: GuestActivation = response
            .json()
            .await
            .map_err(|e| parse_error(e, "guest activation"))?;
        Ok(activation.guest_token)
    }

    async fn login_task(
        &mut self,
        guest_token: &str,
        url: &str,
        body: &Value,
    ) -> Result<FlowResponse> {
        let response = self
            .base_headers(self.http.post(url))
            .header("x-guest-token", guest_token)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| network_error(e, "login"))?;

        self.capture_cookies(&response);
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| network_error(e, "login"))?;

        let flow: FlowResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                parse_error(e, "login")
            } else {
                map_status_error(status, &text, "login")
            }
        })?;

        if let Some(error) = flow.errors.first() {
            return Err(PlatformError::Authentication(format!(
                "X login failed ({}): {}",
                error.code.map(|c| c.to_string()).unwrap_or_else(|| "no code".to_string()),
                error.message
            ))
            .into());
        }
        if !status.is_success() {
            return Err(map_status_error(status, &text, "login").into());
        }

        Ok(flow)
    }

    async fn graphql_get(&self, operation: &GraphqlOperation, variables: Value) -> Result<Value> {
        let url = format!(
            "{}/{}/{}",
            self.graphql_base, operation.query_id, operation.name
        );
        let response = self
            .authorized(self.http.get(&url))
            .query(&[
                ("variables", variables.to_string()),
                ("features", graphql_features().to_string()),
            ])
            .send()
            .await
            .map_err(|e| network_error(e, operation.name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body, operation.name).into());
        }

        response
            .json()
            .await
            .map_err(|e| parse_error(e, operation.name).into())
    }

    async fn fetch_timeline_page(
        &self,
        account: &AccountId,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<TimelinePage> {
        let mut variables = json!({
            "userId": account.as_str(),
            "count": count,
            "includePromotedContent": false,
            "withQuickPromoteEligibilityTweetFields": false,
            "withVoice": true,
            "withV2Timeline": true
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = json!(cursor);
        }

        let body = self.graphql_get(&USER_TWEETS, variables).await?;
        Ok(parse_timeline_page(&body))
    }
}

/// Paging state for the lazy timeline stream
struct TimelineCursor {
    cursor: Option<String>,
    remaining: usize,
    exhausted: bool,
}

#[async_trait]
impl Transport for XClient {
    async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        tracing::debug!("Logging in to X as {}", credentials.username);

        // A fresh login never inherits an old session.
        self.session = Session::default();

        let guest_token = self.guest_token().await?;
        let start_url = format!("{}/1.1/onboarding/task.json?flow_name=login", self.api_base);
        let step_url = format!("{}/1.1/onboarding/task.json", self.api_base);

        let mut flow = self
            .login_task(
                &guest_token,
                &start_url,
                &json!({
                    "flow_token": null,
                    "input_flow_data": {
                        "flow_context": {
                            "debug_overrides": {},
                            "start_location": { "location": "splash_screen" }
                        }
                    }
                }),
            )
            .await?;

        for _ in 0..MAX_LOGIN_STEPS {
            let Some(subtask) = flow.subtasks.first() else {
                break;
            };
            let flow_token = flow.flow_token.clone().ok_or_else(|| {
                PlatformError::Authentication("X login flow returned no flow token".to_string())
            })?;

            tracing::debug!("X login step: {}", subtask.subtask_id);
            match next_login_input(&subtask.subtask_id, &flow_token, credentials)? {
                LoginStep::Done => break,
                LoginStep::Submit(body) => {
                    flow = self.login_task(&guest_token, &step_url, &body).await?;
                }
            }
        }

        if self.session.get("auth_token").is_none() {
            return Err(PlatformError::Authentication(
                "X login finished without an auth_token cookie".to_string(),
            )
            .into());
        }

        tracing::debug!("X login complete ({} cookies)", self.session.cookies().len());
        Ok(())
    }

    fn session(&self) -> Session {
        self.session.clone()
    }

    fn set_session(&mut self, session: Session) -> Result<()> {
        if session.get("ct0").is_none() {
            tracing::warn!("Restored session has no ct0 cookie; authenticated calls may be rejected");
        }
        self.session = session;
        Ok(())
    }

    fn fetch_recent_posts<'a>(&'a self, account: &'a AccountId, count: usize) -> PostStream<'a> {
        let start = TimelineCursor {
            cursor: None,
            remaining: count,
            exhausted: false,
        };

        let pages = futures::stream::try_unfold(start, move |state| async move {
            if state.exhausted || state.remaining == 0 {
                return Ok::<_, MimicastError>(None);
            }

            let page = self
                .fetch_timeline_page(
                    account,
                    state.remaining.min(TIMELINE_PAGE_SIZE),
                    state.cursor.as_deref(),
                )
                .await?;

            let exhausted = page.posts.is_empty()
                || page.bottom_cursor.is_none()
                || page.bottom_cursor == state.cursor;
            let next = TimelineCursor {
                remaining: state.remaining.saturating_sub(page.posts.len()),
                cursor: page.bottom_cursor,
                exhausted,
            };

            Ok(Some((page.posts, next)))
        });

        Box::pin(
            pages
                .map_ok(|posts| futures::stream::iter(posts.into_iter().map(Ok::<_, MimicastError>)))
                .try_flatten()
                .take(count),
        )
    }

    async fn submit_post(&self, text: &str) -> Result<PostAck> {
        let url = format!(
            "{}/{}/{}",
            self.graphql_base, CREATE_TWEET.query_id, CREATE_TWEET.name
        );
        let body = json!({
            "variables": {
                "tweet_text": text,
                "dark_request": false,
                "media": { "media_entities": [], "possibly_sensitive": false },
                "semantic_annotation_ids": []
            },
            "features": graphql_features(),
            "queryId": CREATE_TWEET.query_id
        });

        tracing::debug!("Posting to X: {} characters", text.chars().count());

        let response = self
            .authorized(self.http.post(&url))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(e, "posting"))?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if let Some(message) = body["errors"][0]["message"].as_str() {
            tracing::warn!("X reported an error for the new post: {}", message);
        }

        let id = body["data"]["create_tweet"]["tweet_results"]["result"]["rest_id"]
            .as_str()
            .map(str::to_string);

        Ok(PostAck { status, id })
    }

    async fn resolve_handle(&self, handle: &str) -> Result<AccountId> {
        let body = self
            .graphql_get(
                &USER_BY_SCREEN_NAME,
                json!({ "screen_name": handle, "withSafetyModeUserFields": true }),
            )
            .await?;

        let result = &body["data"]["user"]["result"];
        if result["__typename"] == "UserUnavailable" {
            return Err(PlatformError::UnknownAccount(handle.to_string()).into());
        }

        result["rest_id"]
            .as_str()
            .map(AccountId::new)
            .ok_or_else(|| PlatformError::UnknownAccount(handle.to_string()).into())
    }

    async fn current_profile(&self) -> Result<Profile> {
        let url = format!("{}/1.1/account/verify_credentials.json", self.api_base);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(|e| network_error(e, "profile lookup"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body, "profile lookup").into());
        }

        let verified: VerifiedCredentials = response
            .json()
            .await
            .map_err(|e| parse_error(e, "profile lookup"))?;

        Ok(Profile {
            id: AccountId::new(verified.id_str),
            handle: verified.screen_name,
        })
    }

    fn name(&self) -> &str {
        "x"
    }
}
