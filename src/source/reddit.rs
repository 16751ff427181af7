use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::config::SourceConfig;
use crate::error::{AppError, Result};
use crate::models::Item;

use super::{ContentSource, Fetched, Lookup};

/// Reddit never returns more than this many children per listing request.
const PAGE_LIMIT: usize = 100;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Placeholders Reddit leaves behind when content or accounts go away.
const DELETED_MARKERS: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    author: Option<String>,
    subreddit: String,
    body: Option<String>,
    created_utc: f64,
    score: i64,
    permalink: String,
}

impl CommentData {
    fn into_item(self) -> Result<Item> {
        let created_at = DateTime::from_timestamp(self.created_utc as i64, 0).ok_or_else(|| {
            AppError::Source(format!(
                "comment {} has invalid created_utc {}",
                self.id, self.created_utc
            ))
        })?;

        Ok(Item {
            id: self.id,
            author: self.author.filter(|a| !DELETED_MARKERS.contains(&a.as_str())),
            origin: self.subreddit,
            body: self
                .body
                .filter(|b| !b.trim().is_empty() && !DELETED_MARKERS.contains(&b.trim())),
            created_at,
            score: self.score,
            permalink: self.permalink,
        })
    }
}

impl Listing {
    /// Comments in this listing plus the cursor for the next page.
    fn into_items(self) -> Result<(Vec<Item>, Option<String>)> {
        let items = self
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .map(|thing| serde_json::from_value::<CommentData>(thing.data)?.into_item())
            .collect::<Result<Vec<_>>>()?;
        Ok((items, self.data.after))
    }
}

/// [`ContentSource`] backed by Reddit's public JSON endpoints.
pub struct RedditClient {
    client: Client,
    base_url: Url,
}

impl RedditClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;
        let base_url = Url::parse(&config.base_url)?;

        Ok(Self { client, base_url })
    }

    fn recent_url(&self, limit: usize, after: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.join("/r/all/comments.json")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            query.append_pair("raw_json", "1");
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    fn permalink_url(&self, permalink: &str) -> Result<Url> {
        let mut url = self.base_url.join(permalink)?;
        let path = format!("{}.json", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(Some("raw_json=1"));
        Ok(url)
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn fetch_recent(&self, limit: usize) -> Result<Fetched<Vec<Item>>> {
        let mut items = Vec::with_capacity(limit);
        let mut after: Option<String> = None;

        while items.len() < limit {
            let page = (limit - items.len()).min(PAGE_LIMIT);
            let url = self.recent_url(page, after.as_deref())?;
            let response = self.client.get(url).send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Ok(Fetched::RateLimited(retry_after(response.headers())));
            }

            let listing: Listing = ensure_success(response)?.json().await?;
            let (page_items, next) = listing.into_items()?;
            let received = page_items.len();
            items.extend(page_items);

            match next {
                Some(cursor) if received > 0 => after = Some(cursor),
                _ => break,
            }
        }

        items.truncate(limit);
        Ok(Fetched::Ready(items))
    }

    async fn fetch_by_permalink(&self, permalink: &str) -> Result<Fetched<Lookup>> {
        let url = self.permalink_url(permalink)?;
        let response = self.client.get(url).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Ok(Fetched::RateLimited(retry_after(response.headers())));
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Ok(Fetched::Ready(Lookup::NotFound));
            }
            _ => {}
        }

        // [submission listing, comment listing]
        let listings: Vec<Listing> = ensure_success(response)?.json().await?;
        let item = match listings.into_iter().nth(1) {
            Some(comments) => comments.into_items()?.0.into_iter().next(),
            None => None,
        };

        Ok(Fetched::Ready(item.map_or(Lookup::NotFound, Lookup::Found)))
    }
}

fn ensure_success(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        return Err(AppError::Source(format!(
            "HTTP {} from {}",
            response.status(),
            response.url()
        )));
    }
    Ok(response)
}

/// How long the server asked us to wait before the next request.
fn retry_after(headers: &HeaderMap) -> Duration {
    let seconds = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| Duration::from_secs(secs.ceil() as u64))
    };

    seconds(RETRY_AFTER.as_str())
        .or_else(|| seconds(RATELIMIT_RESET))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    const RECENT: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t1_def",
            "children": [
                {"kind": "t1", "data": {
                    "id": "abc", "author": "alice", "subreddit": "AskReddit",
                    "body": "did you just assume my gender", "created_utc": 1760000000.0,
                    "score": 3, "permalink": "/r/AskReddit/comments/t3x/title/abc/"
                }},
                {"kind": "t1", "data": {
                    "id": "def", "author": "[deleted]", "subreddit": "pics",
                    "body": "[removed]", "created_utc": 1760000001.0,
                    "score": 1, "permalink": "/r/pics/comments/t3y/title/def/"
                }},
                {"kind": "more", "data": {"count": 4, "children": []}}
            ]
        }
    }"#;

    fn client() -> RedditClient {
        RedditClient::new(&SourceConfig::default()).unwrap()
    }

    #[test]
    fn parses_listing_and_cursor() {
        let listing: Listing = serde_json::from_str(RECENT).unwrap();
        let (items, after) = listing.into_items().unwrap();

        assert_eq!(after.as_deref(), Some("t1_def"));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "abc");
        assert_eq!(items[0].author.as_deref(), Some("alice"));
        assert_eq!(items[0].origin, "AskReddit");
        assert_eq!(items[0].created_at.timestamp(), 1_760_000_000);
        assert!(items[0].has_body());
    }

    #[test]
    fn deleted_placeholders_become_absent() {
        let listing: Listing = serde_json::from_str(RECENT).unwrap();
        let (items, _) = listing.into_items().unwrap();

        assert_eq!(items[1].author, None);
        assert_eq!(items[1].body, None);
    }

    #[test]
    fn permalink_listing_without_comment_is_empty() {
        let body = r#"[
            {"kind": "Listing", "data": {"children": [{"kind": "t3", "data": {"id": "t3x"}}]}},
            {"kind": "Listing", "data": {"children": []}}
        ]"#;
        let listings: Vec<Listing> = serde_json::from_str(body).unwrap();
        let comments = listings.into_iter().nth(1).unwrap();
        assert!(comments.into_items().unwrap().0.is_empty());
    }

    #[test]
    fn builds_permalink_json_url() {
        let url = client()
            .permalink_url("/r/AskReddit/comments/t3x/title/abc/")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.reddit.com/r/AskReddit/comments/t3x/title/abc.json?raw_json=1"
        );
    }

    #[test]
    fn builds_recent_url_with_cursor() {
        let url = client().recent_url(100, Some("t1_def")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.reddit.com/r/all/comments.json?limit=100&raw_json=1&after=t1_def"
        );
    }

    #[test]
    fn retry_after_prefers_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        headers.insert(RATELIMIT_RESET, HeaderValue::from_static("120"));
        assert_eq!(retry_after(&headers), Duration::from_secs(30));
    }

    #[test]
    fn retry_after_falls_back_to_reset_then_default() {
        let mut headers = HeaderMap::new();
        headers.insert(RATELIMIT_RESET, HeaderValue::from_static("12.4"));
        assert_eq!(retry_after(&headers), Duration::from_secs(13));

        assert_eq!(retry_after(&HeaderMap::new()), DEFAULT_RETRY_AFTER);
    }
}
