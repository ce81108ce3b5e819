pub mod branch;
pub mod context;
pub mod kinds;
pub mod logging;
pub mod resolve;
pub mod runner;
pub mod scheduler;
pub mod snapshots;
pub mod transform;
pub mod upsert;

/// Reduce free text to a URL-safe slug: lowercase alphanumerics joined by
/// single hyphens.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Cisco Systems"), "cisco-systems");
        assert_eq!(slugify("  C9300-48P  "), "c9300-48p");
        assert_eq!(slugify("Juniper/MX (Core)"), "juniper-mx-core");
        assert_eq!(slugify(""), "");
    }
}
