//! Request identity used for caching and deduplication.

use std::fmt;

/// Deterministic identity of a request: method, endpoint and normalised
/// parameters.
///
/// Two keys built from the same method, endpoint and parameter set compare
/// equal regardless of parameter order, method case or a trailing slash on
/// the endpoint. Keys are immutable once built.
///
/// ```rust
/// # use heimdall::RequestKey;
/// let a = RequestKey::with_params("get", "/api/users/", [("page", "2"), ("sort", "name")]);
/// let b = RequestKey::with_params("GET", "/api/users", [("sort", "name"), ("page", "2")]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "GET /api/users?page=2&sort=name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    repr: String,
    method_len: usize,
    endpoint_len: usize,
}

impl RequestKey {
    /// Key without parameters.
    pub fn new(method: &str, endpoint: &str) -> Self {
        Self::with_params(method, endpoint, std::iter::empty::<(&str, &str)>())
    }

    /// Key with parameters. Parameters are sorted by name, then value.
    pub fn with_params<I, K, V>(method: &str, endpoint: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let method = match method.trim() {
            "" => "GET".to_string(),
            m => m.to_ascii_uppercase(),
        };
        let endpoint = normalize_endpoint(endpoint);

        let mut params: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_string(), v.as_ref().to_string()))
            .collect();
        params.sort();

        let mut repr = format!("{method} {endpoint}");
        if !params.is_empty() {
            // Encoded so a value containing `&` or `=` cannot alias other pairs.
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&params)
                .finish();
            repr.push('?');
            repr.push_str(&query);
        }

        Self {
            method_len: method.len(),
            endpoint_len: endpoint.len(),
            repr,
        }
    }

    /// Upper-cased method.
    pub fn method(&self) -> &str {
        &self.repr[..self.method_len]
    }

    /// Normalised endpoint, used for policy resolution.
    pub fn endpoint(&self) -> &str {
        let start = self.method_len + 1;
        &self.repr[start..start + self.endpoint_len]
    }

    /// Full key string.
    pub fn as_str(&self) -> &str {
        &self.repr
    }
}

/// `GET` request for the given endpoint.
impl From<&str> for RequestKey {
    fn from(endpoint: &str) -> Self {
        Self::new("GET", endpoint)
    }
}

impl From<String> for RequestKey {
    fn from(endpoint: String) -> Self {
        Self::new("GET", &endpoint)
    }
}

impl From<&RequestKey> for RequestKey {
    fn from(key: &RequestKey) -> Self {
        key.clone()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let stripped = trimmed.trim_end_matches('/');
    if stripped.is_empty() && trimmed.starts_with('/') {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_split_repr() {
        let key = RequestKey::with_params("post", "/api/orders", [("id", "7")]);
        assert_eq!(key.method(), "POST");
        assert_eq!(key.endpoint(), "/api/orders");
        assert_eq!(key.as_str(), "POST /api/orders?id=7");
    }

    #[test]
    fn root_endpoint_survives_normalisation() {
        let key = RequestKey::new("GET", "/");
        assert_eq!(key.endpoint(), "/");
    }

    #[test]
    fn method_defaults_to_get() {
        let key = RequestKey::new("  ", "https://example.com/x");
        assert_eq!(key.method(), "GET");
    }

    #[test]
    fn different_params_differ() {
        let a = RequestKey::with_params("GET", "/a", [("q", "1")]);
        let b = RequestKey::with_params("GET", "/a", [("q", "2")]);
        assert_ne!(a, b);
    }

    #[test]
    fn separators_inside_values_do_not_alias_other_pairs() {
        let smuggled = RequestKey::with_params("GET", "/api/x", [("a", "1&b=2")]);
        let split = RequestKey::with_params("GET", "/api/x", [("a", "1"), ("b", "2")]);
        assert_ne!(smuggled, split);
        assert_eq!(split.as_str(), "GET /api/x?a=1&b=2");
        assert_eq!(smuggled.as_str(), "GET /api/x?a=1%26b%3D2");
    }

    #[test]
    fn separators_inside_names_do_not_alias_other_pairs() {
        let a = RequestKey::with_params("GET", "/x", [("a=1&b", "2")]);
        let b = RequestKey::with_params("GET", "/x", [("a", "1"), ("b", "2")]);
        assert_ne!(a, b);
    }

    #[test]
    fn from_str_is_get() {
        let key: RequestKey = "/api/health".into();
        assert_eq!(key, RequestKey::new("GET", "/api/health"));
    }
}
