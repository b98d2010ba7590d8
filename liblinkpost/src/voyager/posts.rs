//! Post creation, editing and deletion over Voyager

use regex::Regex;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::info;

use super::client::VoyagerClient;
use super::endpoints::RequestSpec;
use super::metrics::IdentityResponse;
use crate::error::{ApiResult, ErrorInfo};
use crate::types::{
    ArticleAttachment, CreatePostOptions, HashtagAttribute, MediaRef, PublishedPost,
};

pub const MAX_CONTENT_CHARS: usize = 3000;
pub const MAX_MEDIA: usize = 9;

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#([A-Za-z0-9_]+)").expect("hashtag pattern is valid"))
}

/// Find `#hashtag` spans in source order
///
/// Offsets and lengths are UTF-16 code units and cover the `#` sign.
pub fn extract_hashtags(text: &str) -> Vec<HashtagAttribute> {
    let mut utf16_offset = 0;
    let mut scanned = 0;

    hashtag_pattern()
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let tag = captures.get(1)?;

            utf16_offset += text[scanned..whole.start()].encode_utf16().count();
            scanned = whole.start();

            Some(HashtagAttribute {
                start: utf16_offset,
                length: whole.as_str().encode_utf16().count(),
                tag: tag.as_str().to_string(),
            })
        })
        .collect()
}

/// Publishing operations for one user
#[derive(Clone)]
pub struct PostService {
    client: Arc<VoyagerClient>,
}

impl PostService {
    pub fn new(client: Arc<VoyagerClient>) -> Self {
        Self { client }
    }

    /// Validate, resolve the author and publish
    pub async fn create(&self, options: &CreatePostOptions) -> ApiResult<PublishedPost> {
        validate(options)?;

        let identity: IdentityResponse = self
            .client
            .request(RequestSpec::identity())
            .await
            .into_result()?;
        let author = identity.entity_urn().ok_or_else(|| {
            ErrorInfo::invalid_response("Identity response carried no profile reference")
        })?;

        let payload = SharePayload::new(&author, options);
        let body = to_body(&payload)?;

        let created: ShareResponse = self
            .client
            .request(RequestSpec::share_create(body))
            .await
            .into_result()?;

        let published = created.into_published(None).ok_or_else(|| {
            ErrorInfo::invalid_response("Share response carried no post identifier")
        })?;

        info!(
            post_id = %published.post_id,
            repost = options.is_repost(),
            "Published LinkedIn post"
        );
        Ok(published)
    }

    /// Replace a post's text, re-deriving its hashtags
    pub async fn edit(&self, post_id: &str, new_content: &str) -> ApiResult<PublishedPost> {
        require_id(post_id, "Post id")?;
        if new_content.trim().is_empty() {
            return Err(ErrorInfo::validation("Content cannot be empty"));
        }
        check_length(new_content)?;

        let body = to_body(&EditPayload::new(new_content))?;
        let edited: ShareResponse = self
            .client
            .request(RequestSpec::share_edit(post_id, body))
            .await
            .into_result()?;

        Ok(edited
            .into_published(Some(post_id))
            .unwrap_or_else(|| PublishedPost {
                post_id: post_id.to_string(),
                activity_id: None,
                share_id: None,
            }))
    }

    pub async fn delete(&self, post_id: &str) -> ApiResult<()> {
        require_id(post_id, "Post id")?;

        self.client
            .request::<IgnoredAny>(RequestSpec::share_delete(post_id))
            .await
            .into_result()?;

        info!(post_id, "Deleted LinkedIn post");
        Ok(())
    }

    /// Reshare a post, optionally with commentary
    pub async fn repost(
        &self,
        original_id: &str,
        commentary: Option<&str>,
    ) -> ApiResult<PublishedPost> {
        require_id(original_id, "Original post id")?;
        let options = CreatePostOptions::new(commentary.unwrap_or_default()).reposting(original_id);
        self.create(&options).await
    }
}

/// Reject bad input before any network call
pub fn validate(options: &CreatePostOptions) -> ApiResult<()> {
    match &options.repost_of {
        Some(original) => require_id(original, "Original post id")?,
        None if options.content.trim().is_empty() => {
            return Err(ErrorInfo::validation("Content cannot be empty"));
        }
        None => {}
    }

    check_length(&options.content)?;

    if options.media.len() > MAX_MEDIA {
        return Err(ErrorInfo::validation(format!(
            "A post can carry at most {MAX_MEDIA} media items, got {}",
            options.media.len()
        )));
    }

    if options.article.is_some() && !options.media.is_empty() {
        return Err(ErrorInfo::validation(
            "A post cannot combine an article link with media",
        ));
    }

    if options.media.iter().any(|media| media.urn.trim().is_empty()) {
        return Err(ErrorInfo::validation("Media reference cannot be empty"));
    }

    Ok(())
}

fn check_length(content: &str) -> ApiResult<()> {
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(ErrorInfo::validation(format!(
            "Content exceeds {MAX_CONTENT_CHARS} characters ({chars})"
        )));
    }
    Ok(())
}

fn require_id(id: &str, what: &str) -> ApiResult<()> {
    if id.trim().is_empty() {
        return Err(ErrorInfo::validation(format!("{what} cannot be empty")));
    }
    Ok(())
}

fn to_body<T: Serialize>(payload: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| ErrorInfo::validation(format!("Could not encode request body: {e}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Commentary {
    text: String,
    attributes_v2: Vec<TextAttribute>,
}

impl Commentary {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            attributes_v2: extract_hashtags(text)
                .into_iter()
                .map(TextAttribute::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextAttribute {
    start: usize,
    length: usize,
    attribute_kind_union: AttributeKind,
}

#[derive(Debug, Serialize)]
struct AttributeKind {
    hashtag: HashtagKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HashtagKind {
    hashtag_urn: String,
}

impl From<HashtagAttribute> for TextAttribute {
    fn from(attribute: HashtagAttribute) -> Self {
        Self {
            start: attribute.start,
            length: attribute.length,
            attribute_kind_union: AttributeKind {
                hashtag: HashtagKind {
                    hashtag_urn: format!("urn:li:hashtag:{}", attribute.tag),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaPayload {
    category: &'static str,
    media_urn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt_text: Option<String>,
}

impl From<&MediaRef> for MediaPayload {
    fn from(media: &MediaRef) -> Self {
        Self {
            category: media.category.upstream_value(),
            media_urn: media.urn.clone(),
            alt_text: media.alt_text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArticlePayload {
    source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail_url: Option<String>,
}

impl From<&ArticleAttachment> for ArticlePayload {
    fn from(article: &ArticleAttachment) -> Self {
        Self {
            source_url: article.url.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            thumbnail_url: article.thumbnail_url.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharePayload {
    author: String,
    commentary_v2: Commentary,
    visibility: &'static str,
    origin: &'static str,
    allowed_commentators_scope: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media: Vec<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    article: Option<ArticlePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_urn: Option<String>,
}

impl SharePayload {
    fn new(author: &str, options: &CreatePostOptions) -> Self {
        Self {
            author: author.to_string(),
            commentary_v2: Commentary::new(&options.content),
            visibility: options.visibility.upstream_value(),
            origin: if options.is_repost() { "RESHARE" } else { "FEED" },
            allowed_commentators_scope: "ALL",
            media: options.media.iter().map(MediaPayload::from).collect(),
            article: options.article.as_ref().map(ArticlePayload::from),
            parent_urn: options.repost_of.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EditPayload {
    patch: EditPatch,
}

#[derive(Debug, Serialize)]
struct EditPatch {
    #[serde(rename = "$set")]
    set: EditFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EditFields {
    commentary_v2: Commentary,
}

impl EditPayload {
    fn new(content: &str) -> Self {
        Self {
            patch: EditPatch {
                set: EditFields {
                    commentary_v2: Commentary::new(content),
                },
            },
        }
    }
}

/// Create/edit response; identifiers may sit at the top level or under `value`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareResponse {
    urn: Option<String>,
    share_urn: Option<String>,
    activity_urn: Option<String>,
    value: Option<Box<ShareResponse>>,
}

impl ShareResponse {
    fn flatten(self) -> (Option<String>, Option<String>) {
        let nested = self.value.map(|value| value.flatten()).unwrap_or_default();
        let share_id = self.share_urn.or(self.urn).or(nested.0);
        let activity_id = self.activity_urn.or(nested.1);
        (share_id, activity_id)
    }

    /// `None` when no identifier is present and no fallback was given
    fn into_published(self, fallback_id: Option<&str>) -> Option<PublishedPost> {
        let (share_id, activity_id) = self.flatten();
        let post_id = share_id
            .clone()
            .or_else(|| activity_id.clone())
            .or_else(|| fallback_id.map(str::to_string))?;

        Some(PublishedPost {
            post_id,
            activity_id,
            share_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaCategory, Visibility};
    use serde_json::json;

    fn media(n: usize) -> Vec<MediaRef> {
        (0..n)
            .map(|i| MediaRef {
                urn: format!("urn:li:digitalmediaAsset:{i}"),
                category: MediaCategory::Image,
                alt_text: None,
            })
            .collect()
    }

    #[test]
    fn test_extract_hashtags_positions() {
        let tags = extract_hashtags("Shipping #rust and #async_io today");
        assert_eq!(
            tags,
            vec![
                HashtagAttribute {
                    start: 9,
                    length: 5,
                    tag: "rust".to_string()
                },
                HashtagAttribute {
                    start: 19,
                    length: 9,
                    tag: "async_io".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_extract_hashtags_counts_utf16_units() {
        // the emoji is two UTF-16 code units, é is one
        let tags = extract_hashtags("🚀 café #launch");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].start, 8);
        assert_eq!(tags[0].length, 7);
    }

    #[test]
    fn test_extract_hashtags_ignores_bare_hash() {
        assert!(extract_hashtags("# heading and #").is_empty());
        assert!(extract_hashtags("").is_empty());
    }

    #[test]
    fn test_extract_hashtags_is_idempotent() {
        let text = "Hello #world from #Rust_2024 🎉 #ok";
        let first = extract_hashtags(text);

        let rebuilt: String = {
            let units: Vec<u16> = text.encode_utf16().collect();
            first
                .iter()
                .map(|attr| String::from_utf16(&units[attr.start..attr.start + attr.length]).unwrap())
                .collect::<Vec<_>>()
                .join(" ")
        };
        assert_eq!(rebuilt, "#world #Rust_2024 #ok");
        assert_eq!(extract_hashtags(text), first);
    }

    #[test]
    fn test_validate_rejects_empty_content() {
        let error = validate(&CreatePostOptions::new("   ")).unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::ValidationError);
    }

    #[test]
    fn test_validate_allows_empty_repost() {
        assert!(validate(&CreatePostOptions::default().reposting("urn:li:activity:1")).is_ok());
        assert!(validate(&CreatePostOptions::default().reposting(" ")).is_err());
    }

    #[test]
    fn test_validate_limits() {
        let long = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert!(validate(&CreatePostOptions::new(long)).is_err());
        assert!(validate(&CreatePostOptions::new("a".repeat(MAX_CONTENT_CHARS))).is_ok());

        let mut options = CreatePostOptions::new("gallery");
        options.media = media(MAX_MEDIA + 1);
        assert!(validate(&options).is_err());
        options.media = media(MAX_MEDIA);
        assert!(validate(&options).is_ok());
    }

    #[test]
    fn test_validate_rejects_article_with_media() {
        let options = CreatePostOptions::new("read this")
            .with_media(media(1).remove(0))
            .with_article(ArticleAttachment {
                url: "https://example.com".to_string(),
                title: None,
                description: None,
                thumbnail_url: None,
            });
        assert!(validate(&options).is_err());
    }

    #[test]
    fn test_share_payload_shape() {
        let options = CreatePostOptions::new("Hi #rust")
            .with_visibility(Visibility::ConnectionsOnly)
            .with_media(MediaRef {
                urn: "urn:li:digitalmediaAsset:1".to_string(),
                category: MediaCategory::Document,
                alt_text: Some("slides".to_string()),
            });
        let body = to_body(&SharePayload::new("urn:li:fsd_profile:ME", &options)).unwrap();

        assert_eq!(
            body,
            json!({
                "author": "urn:li:fsd_profile:ME",
                "commentaryV2": {
                    "text": "Hi #rust",
                    "attributesV2": [{
                        "start": 3,
                        "length": 5,
                        "attributeKindUnion": {"hashtag": {"hashtagUrn": "urn:li:hashtag:rust"}}
                    }]
                },
                "visibility": "CONNECTIONS_ONLY",
                "origin": "FEED",
                "allowedCommentatorsScope": "ALL",
                "media": [{
                    "category": "NATIVE_DOCUMENT",
                    "mediaUrn": "urn:li:digitalmediaAsset:1",
                    "altText": "slides"
                }]
            })
        );
    }

    #[test]
    fn test_repost_payload_links_parent() {
        let options = CreatePostOptions::default().reposting("urn:li:activity:9");
        let body = to_body(&SharePayload::new("urn:li:fsd_profile:ME", &options)).unwrap();
        assert_eq!(body["parentUrn"], json!("urn:li:activity:9"));
        assert_eq!(body["origin"], json!("RESHARE"));
        assert!(body.get("media").is_none());
    }

    #[test]
    fn test_edit_payload_is_partial_update() {
        let body = to_body(&EditPayload::new("Updated #news")).unwrap();
        assert_eq!(body["patch"]["$set"]["commentaryV2"]["text"], json!("Updated #news"));
        assert_eq!(
            body["patch"]["$set"]["commentaryV2"]["attributesV2"][0]["start"],
            json!(8)
        );
    }

    #[test]
    fn test_share_response_nested_identifiers() {
        let response: ShareResponse = serde_json::from_value(json!({
            "value": {"urn": "urn:li:share:1", "activityUrn": "urn:li:activity:2"}
        }))
        .unwrap();
        let published = response.into_published(None).unwrap();
        assert_eq!(published.post_id, "urn:li:share:1");
        assert_eq!(published.share_id.as_deref(), Some("urn:li:share:1"));
        assert_eq!(published.activity_id.as_deref(), Some("urn:li:activity:2"));
    }

    #[test]
    fn test_share_response_fallback_id() {
        let published = ShareResponse::default()
            .into_published(Some("urn:li:share:5"))
            .unwrap();
        assert_eq!(published.post_id, "urn:li:share:5");
        assert!(ShareResponse::default().into_published(None).is_none());
    }
}
