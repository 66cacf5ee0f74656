// Path to handler conventions

/// Suffix appended to every handler-group identifier
pub const GROUP_SUFFIX: &str = "Controller";

/// Target identifiers derived from a path or CLI token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub module: String,
    pub group: String,
    /// `None` when the path names no method; the group's entrypoint applies
    pub method: Option<String>,
}

/// Maps `/<module>[/<group>[/<method>]][?query]` to identifiers.
///
/// Purely structural: no lookup happens here.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router;

impl Router {
    pub fn new() -> Self {
        Self
    }

    /// Route a raw path or CLI token. Empty input yields `None`.
    ///
    /// ```
    /// use praetor_core::Router;
    ///
    /// let route = Router::new().route("/user-profile/settings/update-name?x=1").unwrap();
    /// assert_eq!(route.module, "UserProfile");
    /// assert_eq!(route.group, "SettingsController");
    /// assert_eq!(route.method.as_deref(), Some("updateName"));
    /// ```
    pub fn route(&self, path: &str) -> Option<Route> {
        let path = strip_query(path).trim_matches('/');
        if path.is_empty() {
            return None;
        }

        let mut segments = path.splitn(3, '/');
        let module = pascal_case(segments.next()?);
        let group = match segments.next() {
            Some(segment) if !segment.is_empty() => pascal_case(segment),
            _ => module.clone(),
        };
        let method = segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(|segment| lower_first(&pascal_case(segment)));

        Some(Route {
            module,
            group: format!("{}{}", group, GROUP_SUFFIX),
            method,
        })
    }
}

/// Everything before the first `?`
pub fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(path, _)| path)
}

/// Everything after the first `?`, if any
pub fn query_of(path: &str) -> Option<&str> {
    path.split_once('?').map(|(_, query)| query)
}

/// `user-profile` -> `UserProfile`. Only the first letter of each word is
/// touched, the rest keeps its case.
pub fn pascal_case(slug: &str) -> String {
    slug.split('-').map(upper_first).collect()
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("user-profile"), "UserProfile");
        assert_eq!(pascal_case("users"), "Users");
        assert_eq!(pascal_case("api-v2-keys"), "ApiV2Keys");
        assert_eq!(pascal_case("camelAlready"), "CamelAlready");
        assert_eq!(pascal_case("trailing-"), "Trailing");
    }

    #[test]
    fn test_module_only() {
        let route = Router::new().route("/users").unwrap();
        assert_eq!(route.module, "Users");
        assert_eq!(route.group, "UsersController");
        assert_eq!(route.method, None);
    }

    #[test]
    fn test_empty_paths() {
        let router = Router::new();
        assert_eq!(router.route(""), None);
        assert_eq!(router.route("/"), None);
        assert_eq!(router.route("///?a=1"), None);
    }

    #[test]
    fn test_method_segment_keeps_remainder() {
        let route = Router::new().route("shop/cart/add-item/extra").unwrap();
        assert_eq!(route.group, "CartController");
        assert_eq!(route.method.as_deref(), Some("addItem/extra"));
    }

    #[test]
    fn test_query_helpers() {
        assert_eq!(strip_query("a/b?x=1"), "a/b");
        assert_eq!(query_of("a/b?x=1&y=2"), Some("x=1&y=2"));
        assert_eq!(query_of("a/b"), None);
    }
}
