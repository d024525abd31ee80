//! Payload normalization
//!
//! Pure mapping functions, one set per platform, translating each
//! platform's raw JSON shapes into the canonical `Profile`, `Metrics`,
//! and `FetchedPost` types. No network calls, no side effects. Unknown
//! or missing fields map to explicit zero values, never omitted keys,
//! so downstream consumers never branch on presence.

use serde_json::Value;

use crate::transform::{extract_hashtags, extract_mentions};
use crate::types::{FetchedPost, Metrics, Profile};

/// String at a JSON pointer, or empty.
fn text(raw: &Value, pointer: &str) -> String {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Optional string at a JSON pointer.
fn text_opt(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer at a JSON pointer, tolerating numeric strings (YouTube
/// reports statistics as strings), or zero.
fn count(raw: &Value, pointer: &str) -> i64 {
    match raw.pointer(pointer) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// RFC 3339 timestamp at a JSON pointer as Unix seconds.
fn rfc3339(raw: &Value, pointer: &str) -> Option<i64> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}

fn items<'a>(raw: &'a Value, pointer: &str) -> &'a [Value] {
    raw.pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Compute a window aggregate from post-level data, for platforms with
/// no native windowed statistics endpoint.
pub fn metrics_from_posts(profile: &Profile, posts: &[FetchedPost]) -> Metrics {
    let likes: i64 = posts.iter().map(|p| p.likes_count).sum();
    let comments: i64 = posts.iter().map(|p| p.comments_count).sum();
    let shares: i64 = posts.iter().map(|p| p.shares_count).sum();

    Metrics {
        followers: profile.follower_count,
        following: profile.following_count,
        posts: profile.post_count,
        likes,
        comments,
        shares,
        impressions: 0,
        reach: 0,
        engagement_rate: engagement_rate(likes + comments + shares, profile.follower_count),
    }
}

/// Interactions per follower, as a percentage. Zero followers means a
/// zero rate, not a division error.
pub fn engagement_rate(interactions: i64, followers: i64) -> f64 {
    if followers <= 0 {
        return 0.0;
    }
    (interactions as f64 / followers as f64) * 100.0
}

pub mod twitter {
    use super::*;

    /// `GET /2/users/me` with `public_metrics` expansion.
    pub fn profile(raw: &Value) -> Profile {
        Profile {
            platform_user_id: text(raw, "/data/id"),
            username: text(raw, "/data/username"),
            display_name: text_opt(raw, "/data/name"),
            profile_url: text_opt(raw, "/data/url").or_else(|| {
                let username = text(raw, "/data/username");
                (!username.is_empty()).then(|| format!("https://twitter.com/{}", username))
            }),
            avatar_url: text_opt(raw, "/data/profile_image_url"),
            follower_count: count(raw, "/data/public_metrics/followers_count"),
            following_count: count(raw, "/data/public_metrics/following_count"),
            post_count: count(raw, "/data/public_metrics/tweet_count"),
        }
    }

    /// `GET /2/users/:id/tweets`, newest first.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/data")
            .iter()
            .map(|tweet| {
                let content = text(tweet, "/text");
                let hashtags: Vec<String> = items(tweet, "/entities/hashtags")
                    .iter()
                    .map(|h| text(h, "/tag"))
                    .filter(|t| !t.is_empty())
                    .collect();
                let mentions: Vec<String> = items(tweet, "/entities/mentions")
                    .iter()
                    .map(|m| text(m, "/username"))
                    .filter(|u| !u.is_empty())
                    .collect();

                FetchedPost {
                    platform_post_id: text(tweet, "/id"),
                    hashtags: if hashtags.is_empty() {
                        extract_hashtags(&content)
                    } else {
                        hashtags
                    },
                    mentions: if mentions.is_empty() {
                        extract_mentions(&content)
                    } else {
                        mentions
                    },
                    media_urls: items(tweet, "/attachments/media")
                        .iter()
                        .filter_map(|m| text_opt(m, "/url"))
                        .collect(),
                    likes_count: count(tweet, "/public_metrics/like_count"),
                    comments_count: count(tweet, "/public_metrics/reply_count"),
                    shares_count: count(tweet, "/public_metrics/retweet_count"),
                    published_at: rfc3339(tweet, "/created_at"),
                    content,
                }
            })
            .collect()
    }

    /// `POST /2/tweets` response.
    pub fn published_post_id(raw: &Value) -> String {
        text(raw, "/data/id")
    }
}

pub mod instagram {
    use super::*;

    /// `GET /me` on the Instagram Graph API.
    pub fn profile(raw: &Value) -> Profile {
        let username = text(raw, "/username");
        Profile {
            platform_user_id: text(raw, "/id"),
            profile_url: (!username.is_empty())
                .then(|| format!("https://instagram.com/{}", username)),
            username,
            display_name: text_opt(raw, "/name"),
            avatar_url: text_opt(raw, "/profile_picture_url"),
            follower_count: count(raw, "/followers_count"),
            following_count: count(raw, "/follows_count"),
            post_count: count(raw, "/media_count"),
        }
    }

    /// `GET /me/media` with engagement fields.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/data")
            .iter()
            .map(|media| {
                let content = text(media, "/caption");
                FetchedPost {
                    platform_post_id: text(media, "/id"),
                    hashtags: extract_hashtags(&content),
                    mentions: extract_mentions(&content),
                    media_urls: text_opt(media, "/media_url").into_iter().collect(),
                    likes_count: count(media, "/like_count"),
                    comments_count: count(media, "/comments_count"),
                    shares_count: 0,
                    published_at: rfc3339(media, "/timestamp"),
                    content,
                }
            })
            .collect()
    }

    /// `GET /me/insights?metric=impressions,reach&period=day`: fold the
    /// named series onto an aggregate computed from posts.
    pub fn metrics(raw: &Value, profile: &Profile, posts: &[FetchedPost]) -> Metrics {
        let mut metrics = metrics_from_posts(profile, posts);
        for series in items(raw, "/data") {
            let total: i64 = items(series, "/values")
                .iter()
                .map(|v| count(v, "/value"))
                .sum();
            match text(series, "/name").as_str() {
                "impressions" => metrics.impressions = total,
                "reach" => metrics.reach = total,
                _ => {}
            }
        }
        metrics
    }
}

pub mod linkedin {
    use super::*;

    /// `GET /v2/userinfo` plus the optional `networkSizes` response.
    pub fn profile(userinfo: &Value, network: Option<&Value>) -> Profile {
        Profile {
            platform_user_id: text(userinfo, "/sub"),
            username: text(userinfo, "/name"),
            display_name: text_opt(userinfo, "/name"),
            profile_url: None,
            avatar_url: text_opt(userinfo, "/picture"),
            follower_count: network.map(|n| count(n, "/firstDegreeSize")).unwrap_or(0),
            following_count: 0,
            post_count: 0,
        }
    }

    /// `GET /v2/ugcPosts?q=authors`.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/elements")
            .iter()
            .map(|element| {
                let content = text(
                    element,
                    "/specificContent/com.linkedin.ugc.ShareContent/shareCommentary/text",
                );
                // LinkedIn reports creation time in epoch milliseconds.
                let created_ms = count(element, "/created/time");

                FetchedPost {
                    platform_post_id: text(element, "/id"),
                    hashtags: extract_hashtags(&content),
                    mentions: extract_mentions(&content),
                    media_urls: vec![],
                    likes_count: count(element, "/socialDetail/totalSocialActivityCounts/numLikes"),
                    comments_count: count(
                        element,
                        "/socialDetail/totalSocialActivityCounts/numComments",
                    ),
                    shares_count: count(
                        element,
                        "/socialDetail/totalSocialActivityCounts/numShares",
                    ),
                    published_at: (created_ms > 0).then_some(created_ms / 1000),
                    content,
                }
            })
            .collect()
    }

    /// `POST /v2/ugcPosts` response header/body id.
    pub fn published_post_id(raw: &Value) -> String {
        text(raw, "/id")
    }
}

pub mod facebook {
    use super::*;

    /// `GET /me` (page) on the Facebook Graph API.
    pub fn profile(raw: &Value) -> Profile {
        let followers = count(raw, "/followers_count");
        Profile {
            platform_user_id: text(raw, "/id"),
            username: text_opt(raw, "/username").unwrap_or_else(|| text(raw, "/name")),
            display_name: text_opt(raw, "/name"),
            profile_url: text_opt(raw, "/link"),
            avatar_url: text_opt(raw, "/picture/data/url"),
            follower_count: if followers > 0 {
                followers
            } else {
                count(raw, "/fan_count")
            },
            following_count: 0,
            post_count: 0,
        }
    }

    /// `GET /me/posts` with like/comment/share summaries.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/data")
            .iter()
            .map(|post| {
                let content = text(post, "/message");
                FetchedPost {
                    platform_post_id: text(post, "/id"),
                    hashtags: extract_hashtags(&content),
                    mentions: extract_mentions(&content),
                    media_urls: text_opt(post, "/full_picture").into_iter().collect(),
                    likes_count: count(post, "/likes/summary/total_count"),
                    comments_count: count(post, "/comments/summary/total_count"),
                    shares_count: count(post, "/shares/count"),
                    published_at: rfc3339(post, "/created_time"),
                    content,
                }
            })
            .collect()
    }

    /// `GET /me/insights?metric=page_impressions,page_impressions_unique`.
    pub fn metrics(raw: &Value, profile: &Profile, posts: &[FetchedPost]) -> Metrics {
        let mut metrics = metrics_from_posts(profile, posts);
        for series in items(raw, "/data") {
            let total: i64 = items(series, "/values")
                .iter()
                .map(|v| count(v, "/value"))
                .sum();
            match text(series, "/name").as_str() {
                "page_impressions" => metrics.impressions = total,
                "page_impressions_unique" => metrics.reach = total,
                _ => {}
            }
        }
        metrics
    }

    /// `POST /me/feed` response.
    pub fn published_post_id(raw: &Value) -> String {
        text(raw, "/id")
    }
}

pub mod youtube {
    use super::*;

    /// `GET /youtube/v3/channels?part=snippet,statistics&mine=true`.
    /// Statistics arrive as numeric strings.
    pub fn profile(raw: &Value) -> Profile {
        let channel_id = text(raw, "/items/0/id");
        Profile {
            username: text_opt(raw, "/items/0/snippet/customUrl")
                .unwrap_or_else(|| text(raw, "/items/0/snippet/title")),
            display_name: text_opt(raw, "/items/0/snippet/title"),
            profile_url: (!channel_id.is_empty())
                .then(|| format!("https://youtube.com/channel/{}", channel_id)),
            avatar_url: text_opt(raw, "/items/0/snippet/thumbnails/default/url"),
            follower_count: count(raw, "/items/0/statistics/subscriberCount"),
            following_count: 0,
            post_count: count(raw, "/items/0/statistics/videoCount"),
            platform_user_id: channel_id,
        }
    }

    /// `GET /youtube/v3/videos?part=snippet,statistics`.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/items")
            .iter()
            .map(|video| {
                let content = text(video, "/snippet/title");
                FetchedPost {
                    platform_post_id: text(video, "/id"),
                    hashtags: extract_hashtags(&text(video, "/snippet/description")),
                    mentions: vec![],
                    media_urls: text_opt(video, "/snippet/thumbnails/high/url")
                        .into_iter()
                        .collect(),
                    likes_count: count(video, "/statistics/likeCount"),
                    comments_count: count(video, "/statistics/commentCount"),
                    shares_count: 0,
                    published_at: rfc3339(video, "/snippet/publishedAt"),
                    content,
                }
            })
            .collect()
    }

    /// Channel statistics carry a view total; report it as impressions.
    pub fn metrics(raw: &Value, posts: &[FetchedPost]) -> Metrics {
        let profile = profile(raw);
        let mut metrics = metrics_from_posts(&profile, posts);
        metrics.impressions = count(raw, "/items/0/statistics/viewCount");
        metrics
    }
}

pub mod tiktok {
    use super::*;

    /// `POST /v2/user/info/`.
    pub fn profile(raw: &Value) -> Profile {
        Profile {
            platform_user_id: text(raw, "/data/user/open_id"),
            username: text(raw, "/data/user/display_name"),
            display_name: text_opt(raw, "/data/user/display_name"),
            profile_url: text_opt(raw, "/data/user/profile_deep_link"),
            avatar_url: text_opt(raw, "/data/user/avatar_url"),
            follower_count: count(raw, "/data/user/follower_count"),
            following_count: count(raw, "/data/user/following_count"),
            post_count: count(raw, "/data/user/video_count"),
        }
    }

    /// `POST /v2/video/list/`.
    pub fn posts(raw: &Value) -> Vec<FetchedPost> {
        items(raw, "/data/videos")
            .iter()
            .map(|video| {
                let content = text(video, "/video_description");
                let create_time = count(video, "/create_time");
                FetchedPost {
                    platform_post_id: text(video, "/id"),
                    hashtags: extract_hashtags(&content),
                    mentions: extract_mentions(&content),
                    media_urls: text_opt(video, "/cover_image_url").into_iter().collect(),
                    likes_count: count(video, "/like_count"),
                    comments_count: count(video, "/comment_count"),
                    shares_count: count(video, "/share_count"),
                    published_at: (create_time > 0).then_some(create_time),
                    content,
                }
            })
            .collect()
    }

    /// `POST /v2/post/publish/content/init/` response.
    pub fn published_post_id(raw: &Value) -> String {
        text(raw, "/data/publish_id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_twitter_profile_fixture() {
        let raw = json!({
            "data": {
                "id": "2244994945",
                "name": "Acme Inc",
                "username": "acme",
                "profile_image_url": "https://pbs.twimg.com/acme.jpg",
                "public_metrics": {
                    "followers_count": 5120,
                    "following_count": 33,
                    "tweet_count": 812
                }
            }
        });

        let profile = twitter::profile(&raw);
        assert_eq!(profile.platform_user_id, "2244994945");
        assert_eq!(profile.username, "acme");
        assert_eq!(profile.follower_count, 5120);
        assert_eq!(profile.post_count, 812);
        assert_eq!(
            profile.profile_url.as_deref(),
            Some("https://twitter.com/acme")
        );
    }

    #[test]
    fn test_twitter_posts_fixture() {
        let raw = json!({
            "data": [
                {
                    "id": "1700000000000000001",
                    "text": "Shipping day! #launch",
                    "created_at": "2024-06-01T12:00:00Z",
                    "public_metrics": {
                        "like_count": 14,
                        "reply_count": 2,
                        "retweet_count": 5,
                        "impression_count": 900
                    },
                    "entities": {
                        "hashtags": [{"tag": "launch"}],
                        "mentions": []
                    }
                }
            ]
        });

        let posts = twitter::posts(&raw);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].platform_post_id, "1700000000000000001");
        assert_eq!(posts[0].likes_count, 14);
        assert_eq!(posts[0].comments_count, 2);
        assert_eq!(posts[0].shares_count, 5);
        assert_eq!(posts[0].hashtags, vec!["launch"]);
        assert_eq!(posts[0].published_at, Some(1717243200));
    }

    #[test]
    fn test_missing_fields_become_zero_values() {
        let profile = twitter::profile(&json!({}));
        assert_eq!(profile.platform_user_id, "");
        assert_eq!(profile.username, "");
        assert_eq!(profile.follower_count, 0);
        assert!(profile.avatar_url.is_none());

        assert!(instagram::posts(&json!({})).is_empty());
        assert!(tiktok::posts(&json!({"data": {}})).is_empty());
    }

    #[test]
    fn test_instagram_metrics_folds_insights() {
        let profile = Profile {
            follower_count: 200,
            ..Default::default()
        };
        let posts = vec![FetchedPost {
            likes_count: 10,
            comments_count: 5,
            shares_count: 0,
            ..Default::default()
        }];
        let insights = json!({
            "data": [
                {"name": "impressions", "values": [{"value": 400}, {"value": 350}]},
                {"name": "reach", "values": [{"value": 300}]}
            ]
        });

        let metrics = instagram::metrics(&insights, &profile, &posts);
        assert_eq!(metrics.impressions, 750);
        assert_eq!(metrics.reach, 300);
        assert_eq!(metrics.likes, 10);
        assert!((metrics.engagement_rate - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_youtube_numeric_strings() {
        let raw = json!({
            "items": [{
                "id": "UC123",
                "snippet": {
                    "title": "Acme Studio",
                    "customUrl": "@acmestudio",
                    "thumbnails": {"default": {"url": "https://yt.img/acme.jpg"}}
                },
                "statistics": {
                    "subscriberCount": "15400",
                    "videoCount": "220",
                    "viewCount": "1048576"
                }
            }]
        });

        let profile = youtube::profile(&raw);
        assert_eq!(profile.follower_count, 15400);
        assert_eq!(profile.post_count, 220);
        assert_eq!(profile.username, "@acmestudio");

        let metrics = youtube::metrics(&raw, &[]);
        assert_eq!(metrics.impressions, 1_048_576);
    }

    #[test]
    fn test_linkedin_posts_epoch_millis() {
        let raw = json!({
            "elements": [{
                "id": "urn:li:ugcPost:7000",
                "created": {"time": 1717243200000i64},
                "specificContent": {
                    "com.linkedin.ugc.ShareContent": {
                        "shareCommentary": {"text": "Hiring! #jobs"}
                    }
                },
                "socialDetail": {
                    "totalSocialActivityCounts": {
                        "numLikes": 31, "numComments": 4, "numShares": 2
                    }
                }
            }]
        });

        let posts = linkedin::posts(&raw);
        assert_eq!(posts[0].published_at, Some(1717243200));
        assert_eq!(posts[0].likes_count, 31);
        assert_eq!(posts[0].hashtags, vec!["jobs"]);
    }

    #[test]
    fn test_facebook_profile_falls_back_to_fan_count() {
        let raw = json!({
            "id": "page-1",
            "name": "Acme",
            "fan_count": 99
        });
        let profile = facebook::profile(&raw);
        assert_eq!(profile.follower_count, 99);
        assert_eq!(profile.username, "Acme");
    }

    #[test]
    fn test_tiktok_profile_and_posts() {
        let user = json!({
            "data": {"user": {
                "open_id": "open-1",
                "display_name": "acme.clips",
                "follower_count": 7000,
                "following_count": 12,
                "video_count": 45,
                "avatar_url": "https://tt.img/acme.jpg"
            }}
        });
        let profile = tiktok::profile(&user);
        assert_eq!(profile.platform_user_id, "open-1");
        assert_eq!(profile.follower_count, 7000);

        let videos = json!({
            "data": {"videos": [{
                "id": "v-1",
                "video_description": "behind the scenes #making",
                "create_time": 1717000000,
                "like_count": 120,
                "comment_count": 8,
                "share_count": 15
            }]}
        });
        let posts = tiktok::posts(&videos);
        assert_eq!(posts[0].shares_count, 15);
        assert_eq!(posts[0].published_at, Some(1717000000));
        assert_eq!(posts[0].hashtags, vec!["making"]);
    }

    #[test]
    fn test_metrics_from_posts_zero_followers() {
        let metrics = metrics_from_posts(&Profile::default(), &[]);
        assert_eq!(metrics.engagement_rate, 0.0);
    }

    #[test]
    fn test_published_post_id_extractors() {
        assert_eq!(
            twitter::published_post_id(&json!({"data": {"id": "t-9"}})),
            "t-9"
        );
        assert_eq!(
            facebook::published_post_id(&json!({"id": "page_post-3"})),
            "page_post-3"
        );
        assert_eq!(
            tiktok::published_post_id(&json!({"data": {"publish_id": "pub-5"}})),
            "pub-5"
        );
    }
}
