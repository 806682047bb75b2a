//! Provider lookup for model names, used for row labels.

const PREFIXES: &[(&str, &str)] = &[
    ("gpt", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("o4", "openai"),
    ("claude", "anthropic"),
    ("gemini", "google"),
    ("mistral", "mistral"),
    ("mixtral", "mistral"),
    ("codestral", "mistral"),
    ("llama", "meta"),
    ("deepseek", "deepseek"),
    ("grok", "xai"),
    ("command", "cohere"),
];

/// Splits `provider/model` or infers the provider from a known prefix.
pub fn resolve_provider(model: &str) -> Option<(&str, &str)> {
    if let Some((provider, name)) = model.split_once('/') {
        if !provider.is_empty() && !name.is_empty() {
            return Some((provider, name));
        }
    }
    let lower = model.to_ascii_lowercase();
    PREFIXES
        .iter()
        .find(|(prefix, _)| {
            lower.starts_with(prefix)
                && lower[prefix.len()..]
                    .chars()
                    .next()
                    .map_or(true, |next| !next.is_ascii_alphabetic())
        })
        .map(|(_, provider)| (*provider, model))
}

/// `gpt-4o (openai)`, or the bare name when the provider is unknown.
pub fn display_label(model: &str) -> String {
    match resolve_provider(model) {
        Some((provider, name)) => format!("{name} ({provider})"),
        None => model.to_string(),
    }
}
