//! Domain extraction and matching for `network.fetch`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://([a-zA-Z0-9.\-]+)(?::\d+)?").expect("valid pattern"));

/// Lower-case and trim a trailing dot, so `"Example.com."` and
/// `"example.com"` compare equal.
pub fn normalize_domain(domain: &str) -> String {
    domain.to_ascii_lowercase().trim_end_matches('.').to_string()
}

/// Whether `candidate` matches `rule`: exact, `*.`-wildcard (matches
/// any subdomain but not the bare domain), or `.`-prefixed (matches the
/// bare domain and any subdomain).
pub fn domain_matches(rule: &str, candidate: &str) -> bool {
    let rule = normalize_domain(rule);
    let candidate = normalize_domain(candidate);
    if let Some(suffix) = rule.strip_prefix("*.") {
        return candidate != suffix && candidate.ends_with(&format!(".{suffix}"));
    }
    if let Some(suffix) = rule.strip_prefix('.') {
        return candidate == suffix || candidate.ends_with(&format!(".{suffix}"));
    }
    candidate == rule
}

/// Extract candidate hosts from a request: structured `url`/`urls`
/// fields first, falling back to regex-found URLs in any string value.
pub fn extract_candidate_hosts(request: &Value) -> Vec<String> {
    let mut hosts = Vec::new();
    if let Some(url) = request.get("url").and_then(Value::as_str) {
        hosts.extend(host_from_url(url));
    }
    if let Some(urls) = request.get("urls").and_then(Value::as_array) {
        for url in urls.iter().filter_map(Value::as_str) {
            hosts.extend(host_from_url(url));
        }
    }
    if hosts.is_empty() {
        collect_urls_from_freeform(request, &mut hosts);
    }
    hosts
}

fn host_from_url(url: &str) -> Option<String> {
    URL_RE.captures(url).map(|c| c[1].to_string())
}

fn collect_urls_from_freeform(value: &Value, hosts: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for cap in URL_RE.captures_iter(s) {
                hosts.push(cap[1].to_string());
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_urls_from_freeform(v, hosts);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_urls_from_freeform(v, hosts);
            }
        }
        _ => {}
    }
}

/// Whether every candidate host matches at least one allowlist rule.
pub fn all_hosts_allowed(hosts: &[String], rules: &[String]) -> bool {
    !hosts.is_empty() && hosts.iter().all(|host| rules.iter().any(|rule| domain_matches(rule, host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_rule_matches_subdomains_not_bare_domain() {
        assert!(domain_matches("*.example.com", "a.example.com"));
        assert!(domain_matches("*.example.com", "x.y.example.com"));
        assert!(!domain_matches("*.example.com", "example.com"));
    }

    #[test]
    fn dot_prefixed_rule_matches_bare_and_subdomains() {
        assert!(domain_matches(".example.com", "example.com"));
        assert!(domain_matches(".example.com", "a.example.com"));
    }

    #[test]
    fn exact_rule_matches_only_itself_case_and_dot_insensitive() {
        assert!(domain_matches("Example.com.", "example.com"));
        assert!(!domain_matches("example.com", "a.example.com"));
    }

    #[test]
    fn extracts_structured_url_field() {
        let hosts = extract_candidate_hosts(&json!({"url": "https://api.example.com/v1"}));
        assert_eq!(hosts, vec!["api.example.com".to_string()]);
    }

    #[test]
    fn falls_back_to_freeform_scan() {
        let hosts = extract_candidate_hosts(&json!({"command": "curl https://evil.example.org/x"}));
        assert_eq!(hosts, vec!["evil.example.org".to_string()]);
    }
}
