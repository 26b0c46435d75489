//! User agent selection.
//!
//! API sources identify themselves honestly. Travel agency sites often
//! serve a stripped page to unknown clients, so scrapers can present a
//! desktop browser agent instead. A source keeps the same browser agent for
//! the life of the process.

pub const USER_AGENT: &str = concat!("umrahfare/", env!("CARGO_PKG_VERSION"), " (price monitor)");

const BROWSER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentMode {
    /// The crate's own agent string.
    Identify,
    /// A real browser agent, picked per source.
    Browser,
    Custom(String),
}

impl UserAgentMode {
    /// `None` identifies; `"browser"` or `"impersonate"` picks
    /// a browser agent; anything else is sent verbatim.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Identify,
            Some(v) if v.eq_ignore_ascii_case("browser") || v.eq_ignore_ascii_case("impersonate") => {
                Self::Browser
            }
            Some(custom) => Self::Custom(custom.to_string()),
        }
    }
}

/// Agent string a source sends.
pub fn resolve_user_agent(config: Option<&str>, source_name: &str) -> String {
    match UserAgentMode::from_config(config) {
        UserAgentMode::Identify => USER_AGENT.to_string(),
        UserAgentMode::Browser => browser_agent_for(source_name).to_string(),
        UserAgentMode::Custom(agent) => agent,
    }
}

fn browser_agent_for(source_name: &str) -> &'static str {
    let index = source_name
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    BROWSER_AGENTS[index % BROWSER_AGENTS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes() {
        assert_eq!(UserAgentMode::from_config(None), UserAgentMode::Identify);
        assert_eq!(UserAgentMode::from_config(Some(" ")), UserAgentMode::Identify);
        assert_eq!(UserAgentMode::from_config(Some("Browser")), UserAgentMode::Browser);
        assert_eq!(
            UserAgentMode::from_config(Some("FareBot/2.0")),
            UserAgentMode::Custom("FareBot/2.0".to_string())
        );
    }

    #[test]
    fn test_browser_agent_is_stable_per_source() {
        let first = resolve_user_agent(Some("browser"), "traveloka");
        assert!(first.starts_with("Mozilla/5.0"));
        assert_eq!(first, resolve_user_agent(Some("browser"), "traveloka"));
        assert!(resolve_user_agent(None, "xotelo").starts_with("umrahfare/"));
    }
}
