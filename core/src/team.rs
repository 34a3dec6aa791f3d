//! Team member normalisation and deduplication.
//!
//! Team events list the members who attend alongside the registrant (the
//! team leader). Members are normalised on every write and deduplicated
//! against the leader and against each other, so the stored list never
//! contains the leader or the same person twice.

use crate::error::{Result, WorkflowError};
use crate::types::{EventFormat, TeamMember, User};
use std::collections::HashSet;

/// Longest accepted team name.
const MAX_TEAM_NAME_LEN: usize = 80;

/// Trims and collapses internal whitespace.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims and lowercases an email address.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keeps only the digits of a phone number; `None` if none remain.
#[must_use]
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Basic shape check: one `@` with a non-empty local part and a dotted domain.
#[must_use]
pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Normalises one member and validates its fields.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for a blank name, a malformed email
/// or a phone number outside 7 to 15 digits.
pub fn normalize_member(member: &TeamMember) -> Result<TeamMember> {
    let name = normalize_name(&member.name);
    if name.is_empty() {
        return Err(WorkflowError::validation("team member name is required"));
    }

    let email = normalize_email(&member.email);
    if !is_plausible_email(&email) {
        return Err(WorkflowError::validation(format!(
            "team member '{name}' has an invalid email address"
        )));
    }

    let phone = member.phone.as_deref().and_then(normalize_phone);
    if let Some(digits) = &phone {
        if !(7..=15).contains(&digits.len()) {
            return Err(WorkflowError::validation(format!(
                "team member '{name}' has an invalid phone number"
            )));
        }
    }

    Ok(TeamMember { name, email, phone })
}

#[derive(Default)]
struct SeenKeys {
    emails: HashSet<String>,
    phones: HashSet<String>,
    names: HashSet<String>,
}

impl SeenKeys {
    fn contains(&self, member: &TeamMember) -> bool {
        self.emails.contains(&member.email)
            || member
                .phone
                .as_ref()
                .is_some_and(|p| self.phones.contains(p))
            || self.names.contains(&member.name.to_lowercase())
    }

    fn insert(&mut self, member: &TeamMember) {
        self.emails.insert(member.email.clone());
        if let Some(phone) = &member.phone {
            self.phones.insert(phone.clone());
        }
        self.names.insert(member.name.to_lowercase());
    }
}

/// Drops members matching the leader or an earlier member by email, phone
/// or (case-insensitive) name. First occurrence wins.
///
/// Expects already normalised input.
#[must_use]
pub fn dedupe_members(leader: &TeamMember, members: Vec<TeamMember>) -> Vec<TeamMember> {
    let mut seen = SeenKeys::default();
    seen.insert(leader);

    members
        .into_iter()
        .filter(|member| {
            if seen.contains(member) {
                tracing::debug!(member = %member.email, "Dropping duplicate team member");
                false
            } else {
                seen.insert(member);
                true
            }
        })
        .collect()
}

/// Team data after validation, ready to store on a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRoster {
    /// Team name (team events only)
    pub team_name: Option<String>,
    /// Members excluding the leader
    pub members: Vec<TeamMember>,
}

/// Validates and normalises team data for an event.
///
/// Solo events take no team data. Team events need a team name and a total
/// size (leader plus deduplicated members) within the event's bounds.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] on malformed members, a missing team
/// name or a team size outside the allowed range.
pub fn build_roster(
    format: &EventFormat,
    leader: &User,
    team_name: Option<String>,
    members: &[TeamMember],
) -> Result<TeamRoster> {
    let team_name = team_name
        .as_deref()
        .map(normalize_name)
        .filter(|name| !name.is_empty());

    match *format {
        EventFormat::Solo => {
            if !members.is_empty() || team_name.is_some() {
                return Err(WorkflowError::validation(
                    "this event does not accept team registrations",
                ));
            }
            Ok(TeamRoster {
                team_name: None,
                members: Vec::new(),
            })
        }
        EventFormat::Team {
            min_team_size,
            max_team_size,
        } => {
            let Some(team_name) = team_name else {
                return Err(WorkflowError::validation("team name is required"));
            };
            if team_name.chars().count() > MAX_TEAM_NAME_LEN {
                return Err(WorkflowError::validation(format!(
                    "team name must be at most {MAX_TEAM_NAME_LEN} characters"
                )));
            }

            let normalized = members
                .iter()
                .map(normalize_member)
                .collect::<Result<Vec<_>>>()?;
            let leader = TeamMember {
                name: normalize_name(&leader.name),
                email: normalize_email(&leader.email),
                phone: leader.phone.as_deref().and_then(normalize_phone),
            };
            let members = dedupe_members(&leader, normalized);

            let size = u32::try_from(members.len())
                .unwrap_or(u32::MAX)
                .saturating_add(1);
            if size < min_team_size || size > max_team_size {
                return Err(WorkflowError::validation(format!(
                    "team size must be between {min_team_size} and {max_team_size} including the leader, got {size}"
                )));
            }

            Ok(TeamRoster {
                team_name: Some(team_name),
                members,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn member(name: &str, email: &str, phone: Option<&str>) -> TeamMember {
        TeamMember {
            name: name.into(),
            email: email.into(),
            phone: phone.map(Into::into),
        }
    }

    fn leader() -> User {
        let mut user = crate::fixtures::user();
        user.name = "Asha Rao".into();
        user.email = "asha@example.com".into();
        user.phone = Some("9876543210".into());
        user
    }

    const TEAM: EventFormat = EventFormat::Team {
        min_team_size: 2,
        max_team_size: 4,
    };

    #[test]
    fn normalizes_fields() {
        let m = normalize_member(&member("  Ravi   Kumar ", " Ravi@Example.COM ", Some("+91 98765-43211")))
            .unwrap();
        assert_eq!(m.name, "Ravi Kumar");
        assert_eq!(m.email, "ravi@example.com");
        assert_eq!(m.phone.as_deref(), Some("919876543211"));
    }

    #[test]
    fn rejects_malformed_members() {
        assert!(normalize_member(&member("", "a@b.co", None)).is_err());
        assert!(normalize_member(&member("Ravi", "not-an-email", None)).is_err());
        assert!(normalize_member(&member("Ravi", "ravi@example.com", Some("12"))).is_err());
    }

    #[test]
    fn leader_is_never_a_member() {
        let roster = build_roster(
            &TEAM,
            &leader(),
            Some("Byte Me".into()),
            &[
                member("Asha Rao", "other@example.com", None),
                member("Someone", "ASHA@example.com", None),
                member("Ravi", "ravi@example.com", Some("98765 43210")),
                member("Meera", "meera@example.com", None),
            ],
        )
        .unwrap();
        assert_eq!(roster.members.len(), 1);
        assert_eq!(roster.members[0].name, "Meera");
    }

    #[test]
    fn first_duplicate_wins() {
        let roster = build_roster(
            &TEAM,
            &leader(),
            Some("Byte Me".into()),
            &[
                member("Ravi", "ravi@example.com", None),
                member("ravi", "ravi2@example.com", None),
                member("Other", "RAVI@example.com", None),
                member("Meera", "meera@example.com", None),
            ],
        )
        .unwrap();
        let names: Vec<_> = roster.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Ravi", "Meera"]);
    }

    #[test]
    fn team_size_counts_leader_after_dedupe() {
        let only_duplicates = build_roster(
            &TEAM,
            &leader(),
            Some("Solo Squad".into()),
            &[member("Asha Rao", "asha@example.com", None)],
        );
        assert!(matches!(only_duplicates, Err(WorkflowError::Validation(_))));

        let too_many = build_roster(
            &TEAM,
            &leader(),
            Some("Crowd".into()),
            &[
                member("A", "a@example.com", None),
                member("B", "b@example.com", None),
                member("C", "c@example.com", None),
                member("D", "d@example.com", None),
            ],
        );
        assert!(matches!(too_many, Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn team_events_need_a_name_and_solo_events_refuse_teams() {
        assert!(build_roster(&TEAM, &leader(), Some("   ".into()), &[member("B", "b@example.com", None)]).is_err());
        assert!(build_roster(&EventFormat::Solo, &leader(), None, &[member("B", "b@example.com", None)]).is_err());
        assert_eq!(
            build_roster(&EventFormat::Solo, &leader(), None, &[]).unwrap(),
            TeamRoster {
                team_name: None,
                members: vec![],
            }
        );
    }

    fn arb_member() -> impl Strategy<Value = TeamMember> {
        (
            prop::sample::select(vec!["Ann", "Bob", "ann", "Cid", "Dee"]),
            prop::sample::select(vec!["a@x.io", "b@x.io", "A@X.io", "c@x.io"]),
            prop::option::of(prop::sample::select(vec!["1111111", "2222222", "3333333"])),
        )
            .prop_map(|(name, email, phone)| member(name, email, phone))
    }

    proptest! {
        #[test]
        fn dedupe_leaves_no_shared_keys(members in prop::collection::vec(arb_member(), 0..12)) {
            let leader = member("Lead", "lead@x.io", Some("9999999"));
            let normalized: Vec<_> = members.iter().map(|m| normalize_member(m).unwrap()).collect();
            let kept = dedupe_members(&leader, normalized.clone());

            prop_assert!(kept.len() <= normalized.len());
            let mut everyone = vec![leader];
            everyone.extend(kept.iter().cloned());
            for (i, a) in everyone.iter().enumerate() {
                for b in &everyone[i + 1..] {
                    prop_assert_ne!(&a.email, &b.email);
                    prop_assert_ne!(a.name.to_lowercase(), b.name.to_lowercase());
                    if let (Some(pa), Some(pb)) = (&a.phone, &b.phone) {
                        prop_assert_ne!(pa, pb);
                    }
                }
            }
            // first occurrence wins: the first normalised member always survives
            if let Some(first) = normalized.first() {
                prop_assert_eq!(kept.first(), Some(first));
            }
        }
    }
}
