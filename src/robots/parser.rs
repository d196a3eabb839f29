//! robots.txt body validation and rule evaluation

use robotstxt::DefaultMatcher;

/// Directives that mark a body as a robots.txt file
const KNOWN_DIRECTIVES: [&str; 5] = ["user-agent", "allow", "disallow", "sitemap", "crawl-delay"];

/// The ruleset a site publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRobots {
    /// No usable restrictions: the site has no robots.txt, or it is empty
    AllowAll,

    /// A body containing at least one recognized directive
    Rules(String),
}

/// The body was served as robots.txt but holds no directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRobots {
    /// First non-comment line, truncated for logging
    pub first_line: String,
}

impl ParsedRobots {
    /// Validates a robots.txt body
    ///
    /// An empty body (or one holding only comments) allows everything. Any
    /// other body must carry at least one `User-agent`, `Allow`, `Disallow`,
    /// `Sitemap` or `Crawl-delay` line; otherwise it is rejected, which covers
    /// HTML error pages served with a 200.
    pub fn parse(body: &str) -> Result<Self, MalformedRobots> {
        let body = body.trim_start_matches('\u{feff}');

        let mut lines = body
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|line| !line.is_empty())
            .peekable();

        let first_line = match lines.peek() {
            Some(line) => line.chars().take(80).collect::<String>(),
            None => return Ok(Self::AllowAll),
        };

        let recognized = lines.any(|line| {
            line.split_once(':').is_some_and(|(key, _)| {
                KNOWN_DIRECTIVES.contains(&key.trim().to_ascii_lowercase().as_str())
            })
        });

        if recognized {
            Ok(Self::Rules(body.to_string()))
        } else {
            Err(MalformedRobots { first_line })
        }
    }

    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::Rules(body) => {
                DefaultMatcher::default().one_agent_allowed_by_robots(body, agent, url)
            }
        }
    }
}

/// Reduces a full User-Agent header to the product token robots.txt groups match on
///
/// `"ListingIngest/1.0 (+https://example.com)"` becomes `"ListingIngest"`.
pub fn agent_token(user_agent: &str) -> &str {
    let trimmed = user_agent.trim();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(trimmed.len());
    &trimmed[..end]
}
