use super::fingerprint::fingerprint;

/// What to do with a remote copy that no longer matches `last_known`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Local and remote content agree; just record the remote as seen.
    InSync,
    /// Nothing fresh to protect locally; take the remote copy without asking.
    AdoptRemote,
    /// Fresh local edits and divergent remote content; the user decides.
    AskUser,
}

/// Decide how to reconcile `remote` with the editor's `local` content.
///
/// Silent adoption only depends on the recent-edit window. An edit made just
/// before the window closes, but not yet saved, is lost when a poll lands at
/// the wrong moment; the threshold is kept as is and callers log the adoption.
pub fn decide(remote: &str, local: &str, has_recent_edits: bool) -> Resolution {
    if fingerprint(remote) == fingerprint(local) || remote == local {
        return Resolution::InSync;
    }
    if !has_recent_edits {
        return Resolution::AdoptRemote;
    }
    Resolution::AskUser
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_is_in_sync() {
        assert_eq!(decide("same", "same", true), Resolution::InSync);
        assert_eq!(decide("", "", false), Resolution::InSync);
    }

    #[test]
    fn test_stale_view_adopts_remote() {
        assert_eq!(decide("B-version", "A-version", false), Resolution::AdoptRemote);
    }

    #[test]
    fn test_fresh_edits_ask_user() {
        assert_eq!(decide("B-version", "A-version", true), Resolution::AskUser);
    }
}
