/// Placeholder substituted for numeric path segments.
pub const ID_PLACEHOLDER: &str = ":id";

/// Normalize the resource path used as the route-table key.
///
/// A route template already matched by the HTTP layer wins over the
/// heuristic; axum-style `{param}` captures are rewritten to `:param`. Without
/// a template, the query string is stripped and purely numeric segments are
/// replaced by `:id` (`/things/42` -> `/things/:id`).
pub fn normalize_path(raw_path: &str, matched_route: Option<&str>) -> String {
    if let Some(template) = matched_route.filter(|t| !t.is_empty()) {
        return normalize_template(strip_query(template));
    }

    let path = strip_query(raw_path);
    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect();
    trim_trailing_slash(segments.join("/"))
}

/// Normalize an administrator-supplied route path into the key the guard
/// looks up. Accepts both `{param}` templates and concrete paths.
pub fn normalize_route_path(path: &str) -> String {
    normalize_path(&normalize_template(strip_query(path.trim())), None)
}

/// Upper-case and trim an HTTP method for table lookups.
pub fn normalize_method(method: &str) -> String {
    method.trim().to_ascii_uppercase()
}

fn strip_query(path: &str) -> &str {
    let end = path.find(|c| c == '?' || c == '#').unwrap_or(path.len());
    &path[..end]
}

fn normalize_template(template: &str) -> String {
    let segments: Vec<String> = template
        .split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name.trim_start_matches('*')),
            None => segment.to_string(),
        })
        .collect();
    trim_trailing_slash(segments.join("/"))
}

fn trim_trailing_slash(mut path: String) -> String {
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}
