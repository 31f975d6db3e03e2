// Protected-Key Policy
//
// Per component-kind deny-lists of keys that are never surfaced for fuzzing.
// The default tables are static and read-only; a policy may add extra keys
// from configuration. Protected keys are skipped by iterate() and refused
// by set_value()/delete().
//
// Cookie names match exactly. Header names match case-insensitively.

use crate::component::ComponentKind;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

lazy_static! {
    /// Cookies from CDN, analytics and session providers whose mutation breaks
    /// the request without exercising the target logic
    static ref DEFAULT_IGNORED_COOKIE_KEYS: HashSet<&'static str> = [
        "awsELB",
        "AWSALB",
        "AWSALBCORS",
        "__utma",
        "__utmb",
        "__utmc",
        "__utmt",
        "__utmz",
        "_ga",
        "_gat",
        "_gid",
        "_gcl_au",
        "_fbp",
        "fr",
        "__hstc",
        "hubspotutk",
        "__hssc",
        "__hssrc",
        "mp_mixpanel__c",
        "JSESSIONID",
        "NREUM",
        "_pk_id",
        "_pk_ref",
        "_pk_ses",
        "_pk_cvar",
        "_pk_hsr",
        "_hjIncludedInSample",
        "__cfduid",
        "cf_use_ob",
        "cf_ob_info",
        "intercom-session",
        "optimizelyEndUserId",
        "optimizelySegments",
        "optimizelyBuckets",
        "optimizelyPendingLogEvents",
        "YSC",
        "VISITOR_INFO1_LIVE",
        "PREF",
        "GPS",
    ]
    .into_iter()
    .collect();

    /// Connection-envelope headers, stored lowercase
    static ref DEFAULT_IGNORED_HEADER_KEYS: HashSet<&'static str> = [
        "host",
        "content-length",
        "transfer-encoding",
        "connection",
    ]
    .into_iter()
    .collect();
}

/// Default protected keys of one component kind
pub fn default_protected(kind: ComponentKind) -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = match kind {
        ComponentKind::Cookie => DEFAULT_IGNORED_COOKIE_KEYS.iter().copied().collect(),
        ComponentKind::Header => DEFAULT_IGNORED_HEADER_KEYS.iter().copied().collect(),
        ComponentKind::Query | ComponentKind::Body | ComponentKind::Path => Vec::new(),
    };
    keys.sort_unstable();
    keys
}

#[derive(Debug, Clone, Default)]
pub struct ProtectedKeys {
    extra: HashMap<ComponentKind, HashSet<String>>,
}

impl ProtectedKeys {
    /// Policy with only the static default tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the default policy
    pub fn shared() -> Arc<ProtectedKeys> {
        Arc::new(Self::default())
    }

    /// Protect additional keys for a component kind
    pub fn with_extra<I, S>(mut self, kind: ComponentKind, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.extra.entry(kind).or_default();
        for key in keys {
            entry.insert(normalize(kind, &key.into()));
        }
        self
    }

    pub fn is_protected(&self, kind: ComponentKind, key: &str) -> bool {
        let key = normalize(kind, key);
        let default_hit = match kind {
            ComponentKind::Cookie => DEFAULT_IGNORED_COOKIE_KEYS.contains(key.as_str()),
            ComponentKind::Header => DEFAULT_IGNORED_HEADER_KEYS.contains(key.as_str()),
            _ => false,
        };
        default_hit || self.extra.get(&kind).map_or(false, |set| set.contains(&key))
    }
}

fn normalize(kind: ComponentKind, key: &str) -> String {
    match kind {
        ComponentKind::Header => key.to_ascii_lowercase(),
        _ => key.to_string(),
    }
}
