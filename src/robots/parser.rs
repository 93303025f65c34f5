//! Robots.txt parser implementation
//!
//! Matching is delegated to the robotstxt crate; `Sitemap:` lines are read
//! directly since they sit outside user-agent groups.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
    /// True when no robots.txt was served; everything is allowed
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots for an origin without robots.txt
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns true if the origin served a robots.txt file
    pub fn exists(&self) -> bool {
        !self.allow_all
    }

    /// Checks if an absolute URL may be fetched by `user_agent`
    ///
    /// `user_agent` is the product token (`SumiAudit`), not the full header.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Sitemap URLs declared with `Sitemap:` directives, in file order
    pub fn sitemaps(&self) -> Vec<String> {
        self.content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                if !key.trim().eq_ignore_ascii_case("sitemap") {
                    return None;
                }
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_string())
            })
            .collect()
    }
}
