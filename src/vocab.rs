//! Static vocabularies used by the scanner and the analyzer.
//!
//! These are pure data. Nothing here is mutable, so matching stays free of
//! cross-call side effects.

/// Case-insensitive substrings that mark a variable name as security relevant.
pub const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "secret",
    "key",
    "token",
    "auth",
    "credential",
    "private",
    "cert",
    "ssl",
    "api_key",
    "access_key",
    "private_key",
    "client_secret",
];

/// Suffix pairs that name the same concept. Checked in both directions.
pub const NAMING_PAIRS: &[(&str, &str)] = &[
    // database
    ("HOST", "HOSTNAME"),
    ("USER", "USERNAME"),
    ("PASS", "PASSWORD"),
    ("PASSWD", "PASSWORD"),
    ("DB", "DATABASE"),
    // endpoints
    ("URL", "ENDPOINT"),
    ("BASE_URL", "URL"),
    ("URI", "URL"),
    // credentials
    ("KEY", "TOKEN"),
    ("API_KEY", "KEY"),
    ("SECRET", "KEY"),
    ("SECRET_KEY", "SECRET"),
    ("ACCESS_KEY", "KEY"),
    // toggles
    ("ENABLED", "ENABLE"),
    ("DISABLED", "DISABLE"),
    // sizes
    ("COUNT", "SIZE"),
    ("LIMIT", "MAX"),
    ("MIN", "MINIMUM"),
    ("MAX", "MAXIMUM"),
    // durations
    ("TIMEOUT", "DURATION"),
    ("TTL", "TIMEOUT"),
    ("EXPIRY", "TIMEOUT"),
    ("EXPIRE", "EXPIRY"),
    ("PORT", "PORT_NUMBER"),
];

/// Domain prefix families. A used name with one of these prefixes may match
/// its bare form or the bare form under a sibling prefix.
pub const PREFIX_FAMILIES: &[&str] = &[
    // application
    "APP_",
    "APPLICATION_",
    "SERVICE_",
    "PROJECT_",
    // frameworks
    "DJANGO_",
    "FLASK_",
    "FASTAPI_",
    "EXPRESS_",
    // data stores
    "DB_",
    "DATABASE_",
    "POSTGRES_",
    "POSTGRESQL_",
    "MYSQL_",
    "REDIS_",
    "CACHE_",
    "MONGODB_",
    "MONGO_",
    "QDRANT_",
    "VECTOR_",
    "SEARCH_",
    "ELASTIC_",
    "NEO4J_",
    "GRAPH_",
    // cloud and infrastructure
    "AWS_",
    "AZURE_",
    "GCP_",
    "CLOUD_",
    "DOCKER_",
    "KUBERNETES_",
    "K8S_",
    "HELM_",
    // network
    "API_",
    "HTTP_",
    "HTTPS_",
    "SERVER_",
    "CLIENT_",
    "WEBHOOK_",
    "ENDPOINT_",
    "PROXY_",
    // security
    "JWT_",
    "AUTH_",
    "OAUTH_",
    "SECURITY_",
    "SSL_",
    "TLS_",
    // observability
    "LOG_",
    "LOGGING_",
    "DEBUG_",
    "MONITOR_",
    "METRICS_",
    "SENTRY_",
    "PROMETHEUS_",
    // stages
    "DEV_",
    "DEVELOPMENT_",
    "PROD_",
    "PRODUCTION_",
    "TEST_",
    "TESTING_",
    "STAGE_",
    "STAGING_",
];

/// Suffixes that are tried interchangeably on the same base name.
pub const INTERCHANGEABLE_SUFFIXES: &[&str] =
    &["_URL", "_KEY", "_HOST", "_PORT", "_USER", "_PASSWORD"];

/// Prefixes of uppercase tokens that pattern scanning keeps tripping over:
/// HTTP verbs, SQL keywords and literal constants.
pub const PATTERN_DENYLIST: &[&str] = &[
    "HTTP_", "HTTPS_", "GET", "POST", "PUT", "DELETE", "PATCH", "SQL", "SELECT", "INSERT",
    "UPDATE", "TRUE", "FALSE", "NULL", "NONE",
];

/// Whether `name` contains any of [`SENSITIVE_SUBSTRINGS`], ignoring case.
pub fn is_sensitive(name: &str) -> bool {
    let lowered = name.to_lowercase();
    SENSITIVE_SUBSTRINGS
        .iter()
        .any(|needle| lowered.contains(needle))
}

/// Whether `name` follows the uppercase-with-underscores convention and is at
/// least two characters long.
pub fn is_conventional_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() >= 2
        && first.is_ascii_uppercase()
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether a pattern-extracted name starts with a denylisted token.
pub fn is_denylisted(name: &str) -> bool {
    PATTERN_DENYLIST
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_is_case_insensitive() {
        assert!(is_sensitive("DB_PASSWORD"));
        assert!(is_sensitive("github_token"));
        assert!(is_sensitive("STRIPE_API_KEY"));
        assert!(!is_sensitive("LOG_LEVEL"));
    }

    #[test]
    fn conventional_names() {
        assert!(is_conventional_name("DB_HOST"));
        assert!(is_conventional_name("S3"));
        assert!(!is_conventional_name("X"));
        assert!(!is_conventional_name("_PRIVATE"));
        assert!(!is_conventional_name("1PORT"));
        assert!(!is_conventional_name("Api_Key"));
        assert!(!is_conventional_name(""));
    }

    #[test]
    fn denylist_catches_verbs_and_keywords() {
        assert!(is_denylisted("GET"));
        assert!(is_denylisted("SELECT_ALL"));
        assert!(is_denylisted("HTTP_PROXY"));
        assert!(!is_denylisted("DATABASE_URL"));
    }
}
