//! Name generation for resources whose name may be derived from a prefix.

use uuid::Uuid;

/// Prefix used when neither a name nor a prefix is configured.
pub const UNIQUE_ID_PREFIX: &str = "stratus-";

const UNIQUE_SUFFIX_LEN: usize = 32;

/// Returns a fresh unique suffix.
#[must_use]
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Picks the name to create: an explicit name wins, then the prefix plus a
/// unique suffix, then the default prefix plus a unique suffix.
#[must_use]
pub fn create_name(name: &str, name_prefix: &str) -> String {
    if !name.is_empty() {
        return name.to_owned();
    }
    let prefix = if name_prefix.is_empty() {
        UNIQUE_ID_PREFIX
    } else {
        name_prefix
    };
    format!("{prefix}{}", unique_suffix())
}

/// Recovers the prefix of a name that ends with a generated suffix.
#[must_use]
pub fn name_prefix_from_name(name: &str) -> Option<String> {
    let split = name.len().checked_sub(UNIQUE_SUFFIX_LEN)?;
    let (prefix, suffix) = (name.get(..split)?, name.get(split..)?);
    let generated = suffix
        .chars()
        .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
    generated.then(|| prefix.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_name_wins() {
        assert_eq!(create_name("orders", "ignored-"), "orders");
    }

    #[test]
    fn prefix_gets_unique_suffix() {
        let name = create_name("", "orders-");
        assert!(name.starts_with("orders-"));
        assert_eq!(name_prefix_from_name(&name), Some(String::from("orders-")));
    }

    #[test]
    fn default_prefix_is_used_without_name_or_prefix() {
        let name = create_name("", "");
        assert_eq!(
            name_prefix_from_name(&name),
            Some(String::from(UNIQUE_ID_PREFIX))
        );
    }

    #[test]
    fn plain_names_have_no_prefix() {
        assert_eq!(name_prefix_from_name("orders"), None);
        assert_eq!(name_prefix_from_name("orders-not-a-generated-suffix-xyz"), None);
    }
}
