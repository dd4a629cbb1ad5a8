use serde::{Deserialize, Serialize};

/// Who may talk to the agent bound to a channel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// Everyone in the chat is admitted.
    #[default]
    Open,
    /// Only senders matching the allowlist.
    Allowlist,
    /// Nobody is admitted.
    Disabled,
}

/// Check if any of a sender's identifiers is admitted under `policy`.
///
/// Identifiers are usually the numeric peer id and, when known, the
/// username. An explicit [`AccessPolicy::Allowlist`] with an empty list
/// admits nobody.
pub fn admits<'a>(
    policy: AccessPolicy,
    allowlist: &[String],
    identifiers: impl IntoIterator<Item = &'a str>,
) -> bool {
    match policy {
        AccessPolicy::Open => true,
        AccessPolicy::Disabled => false,
        AccessPolicy::Allowlist => {
            !allowlist.is_empty() && identifiers.into_iter().any(|id| is_allowed(id, allowlist))
        },
    }
}

/// Check if a peer matches an allowlist.
///
/// An empty allowlist matches everyone. Entries are matched
/// case-insensitively and support glob-style `*` wildcards. A leading `@`
/// on an entry is ignored so `@alice` and `alice` are equivalent.
pub fn is_allowed(peer_id: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let peer = peer_id.trim_start_matches('@').to_lowercase();
    allowlist.iter().any(|entry| {
        let pat = entry.trim_start_matches('@').to_lowercase();
        if pat.contains('*') {
            glob_match(&pat, &peer)
        } else {
            pat == peer
        }
    })
}

/// Glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() < 2 {
        return pattern == text;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    // The tail must fit after everything matched so far.
    text.len() - pos >= last.len() && text.ends_with(last)
}
