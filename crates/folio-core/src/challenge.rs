//! Anti-bot interstitial detection.
//!
//! Challenge pages usually come back with HTTP 200, so the status code alone
//! says nothing. Detection is a case-insensitive substring scan over a fixed
//! marker table; branded markers come first so the reported provider is as
//! specific as possible.
//!
//! This is a phrase match on provider copy and breaks when a provider
//! rewords its page.

/// A text fragment that identifies a challenge page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeMarker {
    /// Provider reported when this marker matches.
    pub provider: &'static str,
    /// Lowercase fragment searched for in the body.
    pub needle: &'static str,
}

/// Provider reported for the generic verification phrase.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Bundled markers, most specific first.
pub const CHALLENGE_MARKERS: &[ChallengeMarker] = &[
    // Cloudflare
    ChallengeMarker {
        provider: "Cloudflare",
        needle: "cf-browser-verification",
    },
    ChallengeMarker {
        provider: "Cloudflare",
        needle: "cf_chl_opt",
    },
    ChallengeMarker {
        provider: "Cloudflare",
        needle: "performance & security by cloudflare",
    },
    ChallengeMarker {
        provider: "Cloudflare",
        needle: "checking your browser before accessing",
    },
    ChallengeMarker {
        provider: "Cloudflare",
        needle: "<title>just a moment...</title>",
    },
    // DDoS-Guard
    ChallengeMarker {
        provider: "DDoS-Guard",
        needle: "ddos-guard",
    },
    // Sucuri
    ChallengeMarker {
        provider: "Sucuri",
        needle: "sucuri website firewall",
    },
    // Imperva
    ChallengeMarker {
        provider: "Imperva",
        needle: "incapsula incident id",
    },
    // Generic wording used by several providers
    ChallengeMarker {
        provider: UNKNOWN_PROVIDER,
        needle: "please wait while we verify",
    },
];

/// Scans fetched bodies for challenge markers.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    markers: Vec<ChallengeMarker>,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeDetector {
    /// Detector over [`CHALLENGE_MARKERS`].
    pub fn new() -> Self {
        Self::with_markers(CHALLENGE_MARKERS.to_vec())
    }

    /// Detector over a custom marker table. Needles must be lowercase.
    pub fn with_markers(markers: Vec<ChallengeMarker>) -> Self {
        Self { markers }
    }

    pub fn is_challenge(&self, body: &str) -> bool {
        self.detect(body).is_some()
    }

    /// Returns the provider of the first matching marker.
    pub fn detect(&self, body: &str) -> Option<&'static str> {
        let haystack = body.to_lowercase();

        self.markers
            .iter()
            .find(|m| haystack.contains(m.needle))
            .map(|m| m.provider)
    }
}
