// # Registrar Resolution
//
// Pure decision logic for picking the registrar that manages a domain.
// Inputs are the WHOIS-observed registrar, the caller's hint, whether a
// terminal is attached, the TLD preference list, and a credential
// availability probe. The output is an action; carrying it out
// (prompting included) is the engine's job.
//
// Precedence: WHOIS beats the hint whenever WHOIS has credentials. A
// resolution of `Unknown` must never write the domain store.

use tracing::debug;

/// Known registrar name fragments → canonical provider name.
///
/// WHOIS responses name registrars freely ("NameCheap, Inc.",
/// "WEDOS Internet, a.s."); this table folds them onto the names
/// credentials are stored under.
const KNOWN_REGISTRARS: &[(&str, &str)] = &[
    ("namecheap", "namecheap.com"),
    ("wedos", "wedos.com"),
    ("godaddy", "godaddy.com"),
    ("gandi", "gandi.net"),
    ("ovh", "ovh.com"),
    ("porkbun", "porkbun.com"),
    ("cloudflare", "cloudflare.com"),
    ("enom", "enom.com"),
    ("tucows", "tucows.com"),
    ("ionos", "ionos.com"),
];

/// Canonicalize a registrar name.
///
/// Case-insensitive fragment match against the known table; anything
/// unrecognized is lowercased and stripped to `[a-z0-9.-]`. Returns
/// `None` when nothing usable remains.
pub fn canonicalize_registrar(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    for (fragment, canonical) in KNOWN_REGISTRARS {
        if lower.contains(fragment) {
            return Some(canonical.to_string());
        }
    }

    let stripped: String = lower
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if stripped.is_empty() { None } else { Some(stripped) }
}

/// Action produced by the resolution decision table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Query this registrar's provider for the authoritative status
    UseRegistrar(String),
    /// Interactively capture credentials for this registrar first
    PromptForCredentials(String),
    /// WHOIS and the hint disagree and neither side is usable as is;
    /// ask the operator
    PromptMismatch {
        /// Registrar observed via WHOIS
        whois: String,
        /// Registrar hinted by the caller (or remembered locally)
        hint: String,
    },
    /// No registrar could be determined; nothing is persisted
    Unknown,
}

/// Decide which registrar applies to a domain.
///
/// `whois` and `hint` must already be canonicalized. `tld_candidates`
/// is the preference list for the domain's TLD, consulted only when
/// both observations are empty. `has_creds` answers whether credentials
/// are stored for a canonical registrar name.
pub fn decide(
    whois: Option<&str>,
    hint: Option<&str>,
    interactive: bool,
    tld_candidates: &[String],
    has_creds: impl Fn(&str) -> bool,
) -> ResolutionAction {
    let action = match (whois, hint) {
        // Nothing observed anywhere: first listed registrar with
        // credentials wins.
        (None, None) => tld_candidates
            .iter()
            .find(|candidate| has_creds(candidate))
            .map(|candidate| ResolutionAction::UseRegistrar(candidate.clone()))
            .unwrap_or(ResolutionAction::Unknown),

        // Only a hint.
        (None, Some(hint)) => {
            if has_creds(hint) {
                ResolutionAction::UseRegistrar(hint.to_string())
            } else if interactive {
                ResolutionAction::PromptForCredentials(hint.to_string())
            } else {
                ResolutionAction::Unknown
            }
        }

        // WHOIS observed; hint absent.
        (Some(whois), None) => {
            if has_creds(whois) {
                ResolutionAction::UseRegistrar(whois.to_string())
            } else if interactive {
                ResolutionAction::PromptForCredentials(whois.to_string())
            } else {
                ResolutionAction::Unknown
            }
        }

        // WHOIS observed; hint agreeing.
        (Some(whois), Some(hint)) if hint == whois => {
            if has_creds(whois) {
                ResolutionAction::UseRegistrar(whois.to_string())
            } else if interactive {
                ResolutionAction::PromptForCredentials(whois.to_string())
            } else {
                ResolutionAction::Unknown
            }
        }

        // Conflict: WHOIS takes precedence when it has credentials;
        // otherwise ask, or silently fall back to a usable hint.
        (Some(whois), Some(hint)) => {
            if has_creds(whois) {
                ResolutionAction::UseRegistrar(whois.to_string())
            } else if interactive {
                ResolutionAction::PromptMismatch {
                    whois: whois.to_string(),
                    hint: hint.to_string(),
                }
            } else if has_creds(hint) {
                ResolutionAction::UseRegistrar(hint.to_string())
            } else {
                ResolutionAction::Unknown
            }
        }
    };

    debug!(?whois, ?hint, interactive, ?action, "registrar resolution");
    action
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds<'a>(stored: &'a [&'a str]) -> impl Fn(&str) -> bool + 'a {
        move |name| stored.contains(&name)
    }

    #[test]
    fn canonicalizes_known_fragments() {
        assert_eq!(
            canonicalize_registrar("NameCheap, Inc."),
            Some("namecheap.com".to_string())
        );
        assert_eq!(
            canonicalize_registrar("WEDOS Internet, a.s."),
            Some("wedos.com".to_string())
        );
        assert_eq!(
            canonicalize_registrar("GoDaddy.com, LLC"),
            Some("godaddy.com".to_string())
        );
    }

    #[test]
    fn canonicalizes_unknown_names_by_stripping() {
        assert_eq!(
            canonicalize_registrar("Some Registrar GmbH"),
            Some("someregistrargmbh".to_string())
        );
        assert_eq!(
            canonicalize_registrar("registrar.example"),
            Some("registrar.example".to_string())
        );
        assert_eq!(canonicalize_registrar("   "), None);
        assert_eq!(canonicalize_registrar("!!!"), None);
    }

    #[test]
    fn case_1_both_empty_uses_tld_priority() {
        let candidates = vec!["namecheap.com".to_string(), "wedos.com".to_string()];

        // first candidate with credentials wins
        assert_eq!(
            decide(None, None, false, &candidates, creds(&["wedos.com"])),
            ResolutionAction::UseRegistrar("wedos.com".to_string())
        );

        // no candidate has credentials
        assert_eq!(
            decide(None, None, true, &candidates, creds(&[])),
            ResolutionAction::Unknown
        );
    }

    #[test]
    fn case_2_hint_only() {
        assert_eq!(
            decide(None, Some("wedos.com"), false, &[], creds(&["wedos.com"])),
            ResolutionAction::UseRegistrar("wedos.com".to_string())
        );
        assert_eq!(
            decide(None, Some("wedos.com"), true, &[], creds(&[])),
            ResolutionAction::PromptForCredentials("wedos.com".to_string())
        );
        assert_eq!(
            decide(None, Some("wedos.com"), false, &[], creds(&[])),
            ResolutionAction::Unknown
        );
    }

    #[test]
    fn case_3_whois_only() {
        assert_eq!(
            decide(Some("namecheap.com"), None, false, &[], creds(&["namecheap.com"])),
            ResolutionAction::UseRegistrar("namecheap.com".to_string())
        );
        assert_eq!(
            decide(Some("namecheap.com"), None, true, &[], creds(&[])),
            ResolutionAction::PromptForCredentials("namecheap.com".to_string())
        );
        assert_eq!(
            decide(Some("namecheap.com"), None, false, &[], creds(&[])),
            ResolutionAction::Unknown
        );
    }

    #[test]
    fn case_4_whois_and_hint_agree() {
        assert_eq!(
            decide(
                Some("wedos.com"),
                Some("wedos.com"),
                false,
                &[],
                creds(&["wedos.com"])
            ),
            ResolutionAction::UseRegistrar("wedos.com".to_string())
        );
        assert_eq!(
            decide(Some("wedos.com"), Some("wedos.com"), true, &[], creds(&[])),
            ResolutionAction::PromptForCredentials("wedos.com".to_string())
        );
    }

    #[test]
    fn case_5_conflict_whois_wins_with_creds() {
        // WHOIS wins over the hint whenever WHOIS has credentials, even
        // if the hint has them too
        assert_eq!(
            decide(
                Some("namecheap.com"),
                Some("wedos.com"),
                false,
                &[],
                creds(&["namecheap.com", "wedos.com"])
            ),
            ResolutionAction::UseRegistrar("namecheap.com".to_string())
        );
    }

    #[test]
    fn case_5_conflict_interactive_prompts() {
        assert_eq!(
            decide(
                Some("namecheap.com"),
                Some("wedos.com"),
                true,
                &[],
                creds(&["wedos.com"])
            ),
            ResolutionAction::PromptMismatch {
                whois: "namecheap.com".to_string(),
                hint: "wedos.com".to_string(),
            }
        );
    }

    #[test]
    fn case_5_conflict_non_interactive_falls_back_to_hint() {
        assert_eq!(
            decide(
                Some("namecheap.com"),
                Some("wedos.com"),
                false,
                &[],
                creds(&["wedos.com"])
            ),
            ResolutionAction::UseRegistrar("wedos.com".to_string())
        );
        assert_eq!(
            decide(Some("namecheap.com"), Some("wedos.com"), false, &[], creds(&[])),
            ResolutionAction::Unknown
        );
    }
}
