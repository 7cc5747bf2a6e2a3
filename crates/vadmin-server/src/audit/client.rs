//! Client address and platform detection

use std::{net::SocketAddr, sync::LazyLock};

use axum::http::HeaderMap;
use regex::Regex;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Best-effort real client IP
///
/// Prefers the first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket
/// peer. Empty when none is known.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    match forwarded.or_else(real_ip) {
        Some(ip) => ip.to_string(),
        None => peer.map(|p| p.ip().to_string()).unwrap_or_default(),
    }
}

/// Browser patterns, most specific first: Edge and Opera also claim Chrome,
/// Chrome also claims Safari.
static BROWSERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Edge", r"Edg(?:e|A|iOS)?/(\d+)"),
        ("Opera", r"(?:OPR|Opera)/(\d+)"),
        ("Firefox", r"(?:Firefox|FxiOS)/(\d+)"),
        ("Chrome", r"(?:Chrome|CriOS)/(\d+)"),
        ("Safari", r"Version/(\d+)[\d.]*(?: Mobile/\S+)? Safari/"),
        ("IE", r"MSIE (\d+)"),
        ("IE", r"Trident/.*rv:(\d+)"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

/// `product/version` of non-browser clients such as curl or okhttp
static PRODUCT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][\w.-]*)/(\d+)").ok());

fn os_label(user_agent: &str) -> &'static str {
    const OS: [(&str, &str); 7] = [
        ("Windows", "Windows"),
        ("iPhone", "iPhone"),
        ("iPad", "iPad"),
        ("Android", "Android"),
        ("Mac OS X", "Mac"),
        ("CrOS", "ChromeOS"),
        ("Linux", "Linux"),
    ];

    OS.iter()
        .find(|(needle, _)| user_agent.contains(needle))
        .map(|(_, label)| *label)
        .unwrap_or("Unknown")
}

fn browser_label(user_agent: &str) -> Option<String> {
    let browser = BROWSERS.iter().find_map(|(name, re)| {
        re.captures(user_agent)
            .and_then(|c| c.get(1))
            .map(|major| format!("{name} {}", major.as_str()))
    });

    browser.or_else(|| {
        PRODUCT
            .as_ref()?
            .captures(user_agent)
            .filter(|c| &c[1] != "Mozilla")
            .map(|c| format!("{} {}", &c[1], &c[2]))
    })
}

/// OS/device and browser label, e.g. `"Windows Chrome 120"`
pub fn platform(user_agent: &str) -> String {
    let user_agent = user_agent.trim();
    if user_agent.is_empty() {
        return String::new();
    }

    match browser_label(user_agent) {
        Some(browser) => format!("{} {browser}", os_label(user_agent)),
        None => os_label(user_agent).to_string(),
    }
}
