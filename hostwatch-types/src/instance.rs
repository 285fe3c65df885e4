//! Helpers for Prometheus `instance` label values.
//!
//! Instances are usually `host:port`. The host may itself contain colons
//! (bracketed IPv6 literals), so the port is always taken after the last one.

/// Split an instance identifier into host and optional port.
///
/// Splits on the last `:`. Without a colon, the whole string is the host.
///
/// ```rust
/// use hostwatch_types::split_instance;
///
/// assert_eq!(split_instance("10.0.0.5:9100"), ("10.0.0.5", Some("9100")));
/// assert_eq!(split_instance("db-primary"), ("db-primary", None));
/// assert_eq!(split_instance("[::1]:9100"), ("[::1]", Some("9100")));
/// ```
pub fn split_instance(instance: &str) -> (&str, Option<&str>) {
    match instance.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (instance, None),
    }
}

/// The host part of an instance identifier, with any port stripped.
pub fn host_of(instance: &str) -> &str {
    split_instance(instance).0
}
