//! Per-request proxy flow.
//!
//! ```text
//! Init → Authenticating → DomainChecking → Fetching → Rewriting → Done
//!             │                 │              │
//!             ▼                 ▼              ▼
//!          Rejected          Rejected        Failed
//! ```
//!
//! Each request owns its own pass through this flow; the components behind
//! it are shared read-only between requests.

use std::fmt;

use folio_core::{ChapterExtractor, ContentRewriter, ResolvedIdentity, TargetUrl, TokenResolver};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProxyError, Result};
use crate::fetcher::FallbackFetcher;

/// Where a request is in the proxy flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStage {
    Init,
    Authenticating,
    DomainChecking,
    Fetching,
    Rewriting,
    Done,
}

impl fmt::Display for ProxyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyStage::Init => "init",
            ProxyStage::Authenticating => "authenticating",
            ProxyStage::DomainChecking => "domain_checking",
            ProxyStage::Fetching => "fetching",
            ProxyStage::Rewriting => "rewriting",
            ProxyStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A fetched and rewritten page, ready to serve inside an iframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxiedPage {
    pub html: String,
    /// URL the page was actually served from, after redirects.
    pub final_url: Url,
    /// Headers the response must carry.
    pub headers: [(&'static str, &'static str); 2],
    /// User the page was fetched for.
    pub user_id: i64,
}

/// Ties credential resolution, the fetch ladder and the rewriter together.
///
/// The allowlist is the fetcher's own, so the up-front domain check and the
/// redirect policy always agree.
#[derive(Debug)]
pub struct ProxyOrchestrator {
    resolver: TokenResolver,
    fetcher: FallbackFetcher,
    rewriter: ContentRewriter,
    chapters: ChapterExtractor,
}

impl ProxyOrchestrator {
    pub fn new(resolver: TokenResolver, fetcher: FallbackFetcher) -> Self {
        Self {
            resolver,
            fetcher,
            rewriter: ContentRewriter::new(),
            chapters: ChapterExtractor::new(),
        }
    }

    /// Proxies `raw_url` for the caller identified by `header_identity` or
    /// `query_token`.
    ///
    /// The credential is checked before the URL is looked at, and the
    /// allowlist before any network access happens.
    pub async fn proxy(
        &self,
        raw_url: &str,
        header_identity: Option<&ResolvedIdentity>,
        query_token: Option<&str>,
    ) -> Result<ProxiedPage> {
        let mut stage = ProxyStage::Init;

        let result = self
            .run(&mut stage, raw_url, header_identity, query_token)
            .await;

        match &result {
            Ok(page) => info!(
                user_id = page.user_id,
                url = %page.final_url,
                bytes = page.html.len(),
                "Proxied page"
            ),
            Err(e) if e.is_rejection() => {
                info!(stage = %stage, error = %e, "Proxy request rejected")
            }
            Err(e) => warn!(stage = %stage, error = %e, "Proxy request failed"),
        }

        result
    }

    async fn run(
        &self,
        stage: &mut ProxyStage,
        raw_url: &str,
        header_identity: Option<&ResolvedIdentity>,
        query_token: Option<&str>,
    ) -> Result<ProxiedPage> {
        advance(stage, ProxyStage::Authenticating);
        let identity = self.resolver.resolve(header_identity, query_token)?;

        advance(stage, ProxyStage::DomainChecking);
        let target = TargetUrl::parse(raw_url)?;
        if !self.fetcher.allowlist().is_allowed_target(&target) {
            return Err(ProxyError::DomainNotAllowed {
                host: target.normalized_host().to_string(),
            });
        }

        advance(stage, ProxyStage::Fetching);
        let (html, final_url) = self.fetcher.fetch(target.url()).await.into_result()?;

        advance(stage, ProxyStage::Rewriting);
        let page = self.rewriter.rewrite(&html, &final_url);

        advance(stage, ProxyStage::Done);
        Ok(ProxiedPage {
            html: page.html,
            final_url,
            headers: page.headers,
            user_id: identity.id,
        })
    }

    /// Chapter number in `raw_url`, if any.
    pub fn extract_chapter(
        &self,
        raw_url: &str,
    ) -> std::result::Result<Option<i64>, url::ParseError> {
        self.chapters.extract(raw_url)
    }
}

fn advance(stage: &mut ProxyStage, next: ProxyStage) {
    debug!(from = %stage, to = %next, "Proxy stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{JwtCodec, LookupError, ProxySettings, UserLookup};
    use std::sync::Arc;

    struct Readers;

    impl UserLookup for Readers {
        fn find_user_by_id(
            &self,
            id: i64,
        ) -> std::result::Result<Option<ResolvedIdentity>, LookupError> {
            Ok((id == 1).then(|| ResolvedIdentity {
                id: 1,
                username: "reader".into(),
                email: "reader@example.com".into(),
            }))
        }
    }

    fn orchestrator() -> (ProxyOrchestrator, JwtCodec) {
        let codec = JwtCodec::new("test-secret");
        let resolver =
            TokenResolver::new(Arc::new(JwtCodec::new("test-secret")), Arc::new(Readers));
        let settings = ProxySettings {
            allowed_domains: vec!["royalroad.com".into()],
            ..ProxySettings::default()
        };
        let fetcher = FallbackFetcher::new(&settings).unwrap();

        (ProxyOrchestrator::new(resolver, fetcher), codec)
    }

    #[test]
    fn stage_names() {
        assert_eq!(ProxyStage::DomainChecking.to_string(), "domain_checking");
        assert_eq!(ProxyStage::Done.to_string(), "done");
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_first() {
        let (proxy, _) = orchestrator();

        // Bad URL and bad domain are not reported without a credential
        let err = proxy.proxy("not a url", None, None).await.unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));

        let err = proxy
            .proxy("https://evil.test/", None, Some(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }

    #[tokio::test]
    async fn invalid_token_is_rejected() {
        let (proxy, _) = orchestrator();
        let err = proxy
            .proxy("https://royalroad.com/", None, Some("garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (proxy, codec) = orchestrator();
        let token = codec.issue(99).unwrap();
        let err = proxy
            .proxy("https://royalroad.com/", None, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }

    #[tokio::test]
    async fn malformed_url_after_auth() {
        let (proxy, codec) = orchestrator();
        let token = codec.issue(1).unwrap();

        let err = proxy.proxy("not a url", None, Some(&token)).await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedUrl(_)));

        let err = proxy
            .proxy("ftp://royalroad.com/file", None, Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedUrl(_)));
    }

    #[tokio::test]
    async fn domain_not_allowed_with_header_identity() {
        let (proxy, _) = orchestrator();
        let identity = ResolvedIdentity {
            id: 1,
            username: "reader".into(),
            email: "reader@example.com".into(),
        };

        let err = proxy
            .proxy("https://WWW.Evil.test/page", Some(&identity), None)
            .await
            .unwrap_err();
        match err {
            ProxyError::DomainNotAllowed { host } => assert_eq!(host, "evil.test"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extract_chapter() {
        let (proxy, _) = orchestrator();
        assert_eq!(
            proxy.extract_chapter("https://royalroad.com/fiction/1/chapter-42").unwrap(),
            Some(42)
        );
        assert!(proxy.extract_chapter("nope").is_err());
    }
}
