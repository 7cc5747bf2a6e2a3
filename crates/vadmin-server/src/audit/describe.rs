//! Human-readable descriptions of audited calls

use std::collections::HashMap;
use std::str::FromStr;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use vadmin_common::CommonError;

/// Fixed description for one `(verb, path)` pair
///
/// Parsed from `"VERB /path=text"`, e.g. `"POST /materials/upload=Upload material file"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionOverride {
    pub method: String,
    pub path: String,
    pub text: String,
}

impl FromStr for DescriptionOverride {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CommonError::parse("description override", s);

        let (route, text) = s.split_once('=').ok_or_else(invalid)?;
        let (method, path) = route.trim().split_once(' ').ok_or_else(invalid)?;
        let (method, path, text) = (method.trim(), path.trim(), text.trim());

        if method.is_empty() || !path.starts_with('/') || text.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            text: text.to_string(),
        })
    }
}

/// Maps a normalized path and verb to an action description
///
/// Exact overrides win. Otherwise the last non-numeric path segment names the
/// subject: action segments such as `login` or `status` describe an operation
/// on their parent resource, and plain resources get a verb-derived action
/// (`POST /materials` -> "create material"). Anything unmatched falls back to
/// `"<VERB> <path>"`.
#[derive(Debug, Clone, Default)]
pub struct DescriptionResolver {
    overrides: HashMap<(String, String), String>,
}

impl DescriptionResolver {
    pub fn new<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = DescriptionOverride>,
    {
        Self {
            overrides: overrides
                .into_iter()
                .map(|o| ((o.method, o.path), o.text))
                .collect(),
        }
    }

    pub fn resolve(&self, method: &Method, path: &str) -> String {
        let verb = method.as_str().to_uppercase();

        if let Some(text) = self.overrides.get(&(verb.clone(), path.to_string())) {
            return text.clone();
        }

        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && !s.starts_with(':') && s.parse::<i64>().is_err())
            .collect();

        let fallback = || {
            let shown = if path.is_empty() { "/" } else { path };
            format!("{verb} {shown}")
        };

        let Some((subject, parents)) = segments.split_last() else {
            return fallback();
        };
        let parent = parents.last().map(|p| humanize(p));

        if let Some(phrase) = action_phrase(subject, parent.as_deref(), &verb) {
            return phrase;
        }

        match verb_action(&verb) {
            Some(action) => format!("{action} {}", humanize(subject)),
            None => fallback(),
        }
    }
}

fn verb_action(verb: &str) -> Option<&'static str> {
    match verb {
        "POST" => Some("create"),
        "PUT" | "PATCH" => Some("update"),
        "DELETE" => Some("delete"),
        _ => None,
    }
}

fn action_phrase(segment: &str, parent: Option<&str>, verb: &str) -> Option<String> {
    let phrase = match (segment.to_lowercase().as_str(), parent) {
        ("login", _) => "log in".to_string(),
        ("logout", _) => "log out".to_string(),
        ("register", _) => "register account".to_string(),
        ("upload", Some(parent)) => format!("upload {parent}"),
        ("upload", None) => "upload file".to_string(),
        ("export", Some(parent)) => format!("export {parent}"),
        ("import", Some(parent)) => format!("import {parent}"),
        ("status", Some(parent)) => format!("change {parent} status"),
        ("password", Some(parent)) => format!("change {parent} password"),
        ("password", None) => "change password".to_string(),
        ("reset", Some(parent)) => format!("reset {parent}"),
        ("batch", Some(parent)) => format!("batch {} {parent}", verb_action(verb)?),
        _ => return None,
    };
    Some(phrase)
}

/// `user-roles` -> `user role`, `categories` -> `category`
fn humanize(segment: &str) -> String {
    let words: Vec<&str> = segment
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .collect();

    match words.split_last() {
        Some((last, rest)) => {
            let mut out: Vec<String> = rest.iter().map(|w| w.to_lowercase()).collect();
            out.push(singular(&last.to_lowercase()));
            out.join(" ")
        },
        None => segment.to_string(),
    }
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies").filter(|s| !s.is_empty()) {
        return format!("{stem}y");
    }
    if ["sses", "xes", "ches", "shes"].iter().any(|s| word.ends_with(s)) {
        return word[..word.len() - 2].to_string();
    }
    if ["ss", "us", "is"].iter().any(|s| word.ends_with(s)) {
        return word.to_string();
    }
    word.strip_suffix('s')
        .filter(|s| !s.is_empty())
        .unwrap_or(word)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(method: Method, path: &str) -> String {
        DescriptionResolver::default().resolve(&method, path)
    }

    #[test]
    fn test_verb_conventions() {
        assert_eq!(describe(Method::POST, "/materials"), "create material");
        assert_eq!(describe(Method::PUT, "/materials"), "update material");
        assert_eq!(describe(Method::PATCH, "/system/dicts"), "update dict");
        assert_eq!(describe(Method::DELETE, "/materials"), "delete material");
    }

    #[test]
    fn test_numeric_and_placeholder_segments_ignored() {
        assert_eq!(describe(Method::DELETE, "/roles/3/menus"), "delete menu");
        assert_eq!(describe(Method::PUT, "/users/:id/roles"), "update role");
    }

    #[test]
    fn test_action_segments() {
        assert_eq!(describe(Method::POST, "/auth/login"), "log in");
        assert_eq!(describe(Method::POST, "/auth/logout"), "log out");
        assert_eq!(describe(Method::POST, "/materials/upload"), "upload material");
        assert_eq!(describe(Method::PUT, "/users/password"), "change user password");
        assert_eq!(describe(Method::PATCH, "/materials/status"), "change material status");
        assert_eq!(describe(Method::DELETE, "/materials/batch"), "batch delete material");
        assert_eq!(describe(Method::POST, "/records/export"), "export record");
    }

    #[test]
    fn test_humanized_resource_names() {
        assert_eq!(describe(Method::POST, "/user-roles"), "create user role");
        assert_eq!(describe(Method::POST, "/api_groups"), "create api group");
        assert_eq!(describe(Method::POST, "/categories"), "create category");
        assert_eq!(describe(Method::POST, "/boxes"), "create box");
        assert_eq!(describe(Method::POST, "/status"), "create status");
    }

    #[test]
    fn test_fallback_for_unknown_combinations() {
        assert_eq!(describe(Method::POST, "/"), "POST /");
        assert_eq!(describe(Method::POST, ""), "POST /");
        let purge = Method::from_bytes(b"PURGE").unwrap();
        assert_eq!(describe(purge, "/cache"), "PURGE /cache");
        assert_eq!(describe(Method::GET, "/materials/batch"), "GET /materials/batch");
    }

    #[test]
    fn test_override_wins() {
        let resolver = DescriptionResolver::new([
            "POST /materials=Upload new material".parse::<DescriptionOverride>().unwrap(),
        ]);
        assert_eq!(resolver.resolve(&Method::POST, "/materials"), "Upload new material");
        assert_eq!(resolver.resolve(&Method::PUT, "/materials"), "update material");
    }

    #[test]
    fn test_override_parsing() {
        let parsed: DescriptionOverride = "delete /records = Clear records".parse().unwrap();
        assert_eq!(parsed.method, "DELETE");
        assert_eq!(parsed.path, "/records");
        assert_eq!(parsed.text, "Clear records");

        assert!("POST /materials".parse::<DescriptionOverride>().is_err());
        assert!("POST materials=x".parse::<DescriptionOverride>().is_err());
        assert!("/materials=x".parse::<DescriptionOverride>().is_err());
        assert!("POST /materials=".parse::<DescriptionOverride>().is_err());
    }
}
