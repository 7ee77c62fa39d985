//! Shared utilities for distfork.

use std::collections::BTreeMap;

/// Longest display name derived from a command line.
pub const MAX_DISPLAY_NAME_CHARS: usize = 80;

/// Tokens kept when deriving a display name from a long command.
const DISPLAY_NAME_TOKENS: usize = 3;

/// Derive a queue display name from the command tokens.
///
/// Keeps at most the first three tokens and 80 characters, appending `" ..."`
/// when anything was cut.
pub fn display_name_for(command: &[String]) -> String {
    let mut shortened = command.len() > DISPLAY_NAME_TOKENS;
    let mut name = command
        .iter()
        .take(DISPLAY_NAME_TOKENS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    if let Some((cut, _)) = name.char_indices().nth(MAX_DISPLAY_NAME_CHARS) {
        name.truncate(cut);
        shortened = true;
    }

    if shortened {
        name.push_str(" ...");
    }
    name
}

const SENSITIVE_MARKERS: &[&str] = &[
    "TOKEN",
    "SECRET",
    "PASSWORD",
    "PASSWD",
    "API_KEY",
    "PRIVATE_KEY",
    "CREDENTIAL",
];

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    SENSITIVE_MARKERS.iter().any(|m| upper.contains(m))
}

/// Render environment overrides for logging with secret-looking values
/// replaced by `***`.
pub fn mask_env(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(name, value)| {
            if is_sensitive(name) {
                format!("{}=***", name)
            } else {
                format!("{}={}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_display_name_short_command_unchanged() {
        assert_eq!(display_name_for(&tokens(&["make", "-j4"])), "make -j4");
        assert_eq!(display_name_for(&tokens(&["a", "b", "c"])), "a b c");
    }

    #[test]
    fn test_display_name_keeps_three_tokens() {
        assert_eq!(
            display_name_for(&tokens(&["cargo", "test", "--release", "--workspace"])),
            "cargo test --release ..."
        );
    }

    #[test]
    fn test_display_name_truncates_long_token() {
        let long = "x".repeat(120);
        let name = display_name_for(&tokens(&[&long]));
        assert_eq!(name, format!("{} ...", "x".repeat(80)));
    }

    #[test]
    fn test_display_name_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let name = display_name_for(&tokens(&[&long]));
        assert_eq!(name.chars().count(), 84);
        assert!(name.ends_with(" ..."));
    }

    #[test]
    fn test_mask_env_hides_secrets() {
        let mut env = BTreeMap::new();
        env.insert("GITHUB_TOKEN".to_string(), "ghp_abc".to_string());
        env.insert("db_password".to_string(), "hunter2".to_string());
        env.insert("CC".to_string(), "clang".to_string());

        let masked = mask_env(&env);
        assert_eq!(masked, "CC=clang GITHUB_TOKEN=*** db_password=***");
    }
}
