//! Plan-scoped capability tokens.
//!
//! Defines which content a user may reach for each plan. Access control
//! elsewhere asks "does the set contain token X", never "what plan is this".

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::billing::PlanType;

/// A single capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Entitlement {
    FreeContent,
    JuniorTrack,
    IntermediateTrack,
    SeniorTrack,
    UnlimitedPractice,
    MockInterviews,
    AllAccess,
}

impl Entitlement {
    pub const ALL: [Entitlement; 7] = [
        Entitlement::FreeContent,
        Entitlement::JuniorTrack,
        Entitlement::IntermediateTrack,
        Entitlement::SeniorTrack,
        Entitlement::UnlimitedPractice,
        Entitlement::MockInterviews,
        Entitlement::AllAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entitlement::FreeContent => "content:free",
            Entitlement::JuniorTrack => "track:junior",
            Entitlement::IntermediateTrack => "track:intermediate",
            Entitlement::SeniorTrack => "track:senior",
            Entitlement::UnlimitedPractice => "practice:unlimited",
            Entitlement::MockInterviews => "interview:mock",
            Entitlement::AllAccess => "bundle:all_access",
        }
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entitlement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entitlement::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown entitlement token '{}'", s))
    }
}

impl TryFrom<String> for Entitlement {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Entitlement> for String {
    fn from(e: Entitlement) -> Self {
        e.as_str().to_string()
    }
}

/// Role of the user, consulted alongside the plan when resolving access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Student,
    Admin,
}

/// The tokens one plan grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSet {
    pub plan: PlanType,
    pub entitlements: BTreeSet<Entitlement>,
}

impl EntitlementSet {
    /// Get the token set for a plan.
    ///
    /// # Entitlement Table
    ///
    /// | Plan | Tokens |
    /// |------|--------|
    /// | FREE | content:free |
    /// | JUNIOR | content:free, track:junior |
    /// | INTERMEDIATE | content:free, track:intermediate, practice:unlimited |
    /// | SENIOR | content:free, track:senior, practice:unlimited, interview:mock |
    /// | BUNDLE | content:free, track:junior, track:intermediate, track:senior, practice:unlimited, interview:mock, bundle:all_access |
    pub fn for_plan(plan: PlanType) -> Self {
        use Entitlement::*;
        let tokens: &[Entitlement] = match plan {
            PlanType::Free => &[FreeContent],
            PlanType::Junior => &[FreeContent, JuniorTrack],
            PlanType::Intermediate => &[FreeContent, IntermediateTrack, UnlimitedPractice],
            PlanType::Senior => &[FreeContent, SeniorTrack, UnlimitedPractice, MockInterviews],
            PlanType::Bundle => &[
                FreeContent,
                JuniorTrack,
                IntermediateTrack,
                SeniorTrack,
                UnlimitedPractice,
                MockInterviews,
                AllAccess,
            ],
        };
        Self {
            plan,
            entitlements: tokens.iter().copied().collect(),
        }
    }

    /// The default set for users without an active subscription.
    pub fn free() -> Self {
        Self::for_plan(PlanType::Free)
    }

    /// Applies the role overlay: admins see everything.
    pub fn with_role(mut self, role: UserRole) -> Self {
        if role == UserRole::Admin {
            self.entitlements = Entitlement::ALL.into_iter().collect();
        }
        self
    }

    pub fn contains(&self, entitlement: Entitlement) -> bool {
        self.entitlements.contains(&entitlement)
    }

    /// Checks a raw token string, for callers that only know the token name.
    pub fn allows(&self, token: &str) -> bool {
        token
            .parse::<Entitlement>()
            .map(|e| self.contains(e))
            .unwrap_or(false)
    }

    /// Tokens as strings, sorted.
    pub fn tokens(&self) -> Vec<String> {
        self.entitlements.iter().map(|e| e.as_str().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_only_has_free_content() {
        let set = EntitlementSet::free();
        assert_eq!(set.tokens(), vec!["content:free".to_string()]);
    }

    #[test]
    fn every_plan_includes_free_content() {
        for plan in PlanType::ALL {
            assert!(EntitlementSet::for_plan(plan).contains(Entitlement::FreeContent));
        }
    }

    #[test]
    fn intermediate_grants_intermediate_track_but_not_senior() {
        let set = EntitlementSet::for_plan(PlanType::Intermediate);
        assert!(set.allows("track:intermediate"));
        assert!(!set.allows("track:senior"));
        assert!(!set.allows("interview:mock"));
    }

    #[test]
    fn senior_and_bundle_are_distinguishable() {
        let senior = EntitlementSet::for_plan(PlanType::Senior);
        let bundle = EntitlementSet::for_plan(PlanType::Bundle);
        assert!(bundle.contains(Entitlement::AllAccess));
        assert!(!senior.contains(Entitlement::AllAccess));
        assert!(!senior.contains(Entitlement::JuniorTrack));
    }

    #[test]
    fn admin_role_sees_every_token() {
        let set = EntitlementSet::free().with_role(UserRole::Admin);
        assert_eq!(set.entitlements.len(), Entitlement::ALL.len());
    }

    #[test]
    fn student_role_is_unchanged() {
        let set = EntitlementSet::for_plan(PlanType::Junior).with_role(UserRole::Student);
        assert_eq!(set, EntitlementSet::for_plan(PlanType::Junior));
    }

    #[test]
    fn unknown_tokens_are_never_allowed() {
        assert!(!EntitlementSet::for_plan(PlanType::Bundle).allows("track:principal"));
    }

    #[test]
    fn tokens_serialize_as_strings() {
        let json = serde_json::to_value(EntitlementSet::for_plan(PlanType::Junior)).unwrap();
        assert_eq!(
            json["entitlements"],
            serde_json::json!(["content:free", "track:junior"])
        );
    }
}
